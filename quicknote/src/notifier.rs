use console::style;
use quicknote_core::vault::Notifier;

/// Prints notices to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notice(&self, message: &str) {
        eprintln!("{} {}", style("»").cyan().bold(), style(message).bold());
    }
}
