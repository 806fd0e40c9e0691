//! Console rendering of broker notifications

use colored::Colorize;
use telephone_broker::MessageDisplay;

/// Prints refined messages to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleDisplay;

impl MessageDisplay for ConsoleDisplay {
    fn on_message_refined(&self, original: &str, refined: &str, hops: u32) {
        println!(
            "{} {} {} {}",
            format!("[hop {}]", hops).dimmed(),
            original,
            "→".cyan(),
            refined.green().bold()
        );
    }

    fn on_connect_failed(&self) {
        println!("{} Could not join the mesh", "✗".red().bold());
    }
}
