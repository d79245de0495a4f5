use std::io::{self, IsTerminal};

use clap::ColorChoice;

use crate::cli::{GlobalArgs, ListArgs};
use crate::context::{CliResult, open_engine};
use crate::output::render_report;

pub(crate) fn handle_list(global: &GlobalArgs, args: &ListArgs) -> CliResult<()> {
    let engine = open_engine(global)?;
    let report = engine.list()?;
    let color = use_color(args.color, io::stdout().is_terminal());
    println!("{}", render_report(&report, global.output, color)?);
    Ok(())
}

const fn use_color(choice: ColorChoice, terminal: bool) -> bool {
    match choice {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => terminal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_color_follows_the_terminal() {
        assert!(use_color(ColorChoice::Auto, true));
        assert!(!use_color(ColorChoice::Auto, false));
        assert!(use_color(ColorChoice::Always, false));
        assert!(!use_color(ColorChoice::Never, true));
    }
}
