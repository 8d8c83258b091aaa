//! Turns scan results into the lines printed on the console.
use crate::scanner::{ScanOutcome, ScanResult};
use colored::Colorize;

/// How results are printed.
///   - greppable prints `<address> <name>` and nothing else.
///   - accessible drops colours.
///   - show_failed also prints addresses whose lookups all failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReportStyle {
    pub greppable: bool,
    pub accessible: bool,
    pub show_failed: bool,
}

/// Formats one result, or `None` when the style hides it.
///
/// ```rust
/// # use std::net::Ipv4Addr;
/// # use hostsweep::report::{format_result, ReportStyle};
/// # use hostsweep::scanner::{ScanOutcome, ScanResult};
/// let result = ScanResult {
///     address: Ipv4Addr::new(192, 168, 1, 4),
///     outcome: ScanOutcome::NoName,
/// };
/// let style = ReportStyle { accessible: true, ..ReportStyle::default() };
/// assert_eq!(
///     format_result(&result, &style).as_deref(),
///     Some("IP 192.168.1.4: Hostname - N/A")
/// );
/// ```
pub fn format_result(result: &ScanResult, style: &ReportStyle) -> Option<String> {
    let name = match &result.outcome {
        ScanOutcome::Resolved(name) => name.as_str(),
        ScanOutcome::NoName => "N/A",
        ScanOutcome::Failed if style.show_failed => {
            return Some(if style.greppable {
                format!("{} -", result.address)
            } else if style.accessible {
                format!("IP {}: no response", result.address)
            } else {
                format!("IP {}: no response", result.address).red().to_string()
            });
        }
        ScanOutcome::Failed => return None,
    };

    let line = if style.greppable {
        format!("{} {}", result.address, name)
    } else if style.accessible {
        format!("IP {}: Hostname - {}", result.address, name)
    } else {
        format!("IP {}: Hostname - {}", result.address, name)
            .green()
            .to_string()
    };
    Some(line)
}
