fn main() {
    std::process::exit(pkgmux::run_cli());
}
