//! zone-receiver entry point
//!
//! Minimal main that delegates to the library.

use clap::Parser;

fn main() {
    // Configure miette for startup error reporting
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(false)
                .unicode(true)
                .context_lines(2)
                .tab_width(4)
                .build(),
        )
    }))
    .ok();

    let cli = zone_receiver::Cli::parse();

    if let Err(e) = zone_receiver::run(cli) {
        let miette_error = miette::Report::msg(format!("{e:#}"));
        eprintln!("{miette_error:?}");
        std::process::exit(1);
    }
}
