fn main() {
    if let Err(err) = s3manager_lib::run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
