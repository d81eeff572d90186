//! # Attribute Text
//!
//! Text the host exposes through its device attributes. Registering the
//! attribute files is the host's business; this module only renders.

use alloc::string::String;
use core::fmt::Write;

use sdwatch_hal::Nanoseconds;

use crate::card::tray_label;
use crate::classifier::StatusErrorCounters;
use crate::errlog::{ErrorKind, ErrorLogTable};

fn millis(t: Option<Nanoseconds>) -> u64 {
    t.map_or(0, |t| t.as_millis())
}

/// Error log, one line per (phase, kind) slot
///
/// Times are milliseconds of the monotonic clock, `0` when unset.
pub fn render_error_log(table: &ErrorLogTable) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        " type :  err    status    first_issue_time   last_issue_time      count"
    );
    for entry in table.entries() {
        let _ = writeln!(
            out,
            "{:<5}: {:>4} 0x{:08x} {:>17} {:>17} {:>10}",
            entry.label(),
            entry.kind.errno(),
            entry.status.raw(),
            millis(entry.first_issue_time),
            millis(entry.last_issue_time),
            entry.count
        );
    }
    out
}

/// One-line summary of every counter
pub fn render_summary(
    counters: &StatusErrorCounters,
    table: &ErrorLogTable,
    detect_count: u32,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\"GE\":\"{}\",\"CC\":\"{}\",\"ECC\":\"{}\",\"WP\":\"{}\",\"OOR\":\"{}\",\
         \"CRC\":\"{}\",\"TMO\":\"{}\",\"NOTI\":\"{}\",\"CD\":\"{}\"",
        counters.general_error,
        counters.cc_error,
        counters.ecc_error,
        counters.write_protect,
        counters.out_of_range,
        table.total_of(ErrorKind::DataCorruption),
        table.total_of(ErrorKind::Timeout),
        counters.notification,
        detect_count
    );
    out
}

/// Tray status line
pub fn render_tray(present: bool) -> String {
    let mut out = String::from(tray_label(present));
    out.push('\n');
    out
}
