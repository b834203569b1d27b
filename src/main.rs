fn main() {
    if let Err(err) = breathwork_lib::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
