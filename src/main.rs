fn main() -> std::process::ExitCode {
    medicare_lib::run()
}
