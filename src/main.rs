fn main() {
    if let Err(err) = closer_targets::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
