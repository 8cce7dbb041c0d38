fn main() {
    match pydoctor::cli::run() {
        Ok(code) => std::process::exit(code.as_i32()),
        Err(err) => {
            pydoctor::ui::eprintln_error(&err);
            std::process::exit(pydoctor::exit::exit_code(&err));
        }
    }
}
