#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use closer_targets::{
    config::Config,
    io_utils,
    session::Session,
    source::SqliteSource,
};
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn warehouse(&self) -> PathBuf {
        self.path().join("targets.db")
    }
}

/// Loads every fixture table into `source`.
pub fn seed(source: &mut SqliteSource, config: &Config) {
    source.init_schema(&config.tables).expect("schema");
    for (fixture, table) in [
        ("targets.csv", &config.tables.targets),
        ("markets.csv", &config.tables.markets),
        ("users.csv", &config.tables.users),
        ("appointments.csv", &config.tables.appointments),
    ] {
        let frame = io_utils::read_frame(&fixture_path(fixture), b',', encoding_rs::UTF_8)
            .expect("read fixture");
        source.insert_frame(table, &frame).expect("seed table");
    }
}

/// A fresh session over an in-memory warehouse holding the fixtures.
pub fn seeded_session() -> (Session, SqliteSource) {
    let config = Config::default();
    let mut source = SqliteSource::open_in_memory().expect("in-memory warehouse");
    seed(&mut source, &config);
    (Session::new(config), source)
}
