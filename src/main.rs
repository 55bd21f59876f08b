fn main() {
    if let Err(err) = shadoweye::cli::run() {
        shadoweye::ui::eprintln_error(&err);
        std::process::exit(shadoweye::exit::exit_code(&err));
    }
}
