use std::process;

fn main() {
    process::exit(dockconf_cli::run());
}
