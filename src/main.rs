fn main() -> std::process::ExitCode {
  flicswitch_lib::run()
}
