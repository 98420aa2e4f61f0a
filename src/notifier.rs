//! The notification port and the HTML digest renderer handed to it.
use async_trait::async_trait;

/// `notify(to, recipient, html_body) -> Ok | Error`. The core supplies one
/// HTML document per flush, per device.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, to: &str, recipient: &str, html_body: &str) -> Result<(), NotifyError>;
}

#[derive(thiserror::Error, Debug)]
#[error("notify failed: {0}")]
pub struct NotifyError(pub String);

/// One rendered row: either a call or a completed SMS, carrying the fields
/// `render_digest` prints into the `<table>`.
pub enum DigestEntry<'a> {
    Call { timestamp_ns: i64, peer: &'a str, call_type: &'a str, duration_ns: i64 },
    Sms { sent_ns: i64, received_ns: i64, peer: &'a str, body: &'a str },
}

/// Render a batch of calls/messages into a single HTML document, mirroring
/// the `<table>` digest the source emails out per upload. One row per call,
/// one (date/time/peer row + full-width body row) pair per SMS.
pub fn render_digest(entries: &[DigestEntry]) -> String {
    let mut out = String::new();
    out.push_str(
        "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Transitional//EN\" \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd\">\n\
<html xmlns=\"http://www.w3.org/1999/xhtml\">\n\
<head>\n\
<style>\n\
table { border: 1px solid black; border-collapse: collapse }\n\
th { border: 1px solid black; border-collapse: collapse }\n\
td { border: 1px solid black; border-collapse: collapse }\n\
</style>\n\
</head>\n\
<body>\n\
<table>\n",
    );

    for entry in entries {
        match entry {
            DigestEntry::Call { timestamp_ns, peer, call_type, duration_ns } => {
                out.push_str("<tr>\n");
                out.push_str(&format!("<td>{}</td>\n", format_datetime(*timestamp_ns)));
                out.push_str(&format!("<td>{}</td>\n", escape_html(peer)));
                out.push_str(&format!("<td>{}</td>\n", escape_html(call_type)));
                out.push_str(&format!("<td>{}</td>\n", format_duration(*duration_ns)));
                out.push_str("</tr>\n");
            }
            DigestEntry::Sms { sent_ns, received_ns, peer, body } => {
                out.push_str("<tr>\n");
                out.push_str(&format!("<td>{}</td>\n", format_date(*sent_ns)));
                out.push_str(&format!("<td>{}</td>\n", format_time(*sent_ns)));
                out.push_str(&format!("<td>{}</td>\n", format_time(*received_ns)));
                out.push_str(&format!("<td>{}</td>\n", escape_html(peer)));
                out.push_str("</tr>\n");
                out.push_str(&format!(
                    "<tr><th colspan=\"4\">{}</th>\n</tr>\n",
                    escape_html(body)
                ));
            }
        }
    }

    out.push_str("</table>\n</body>\n</html>\n");
    out
}

/// Escape `&`, `<`, `>`, and `"` for safe inclusion in HTML text/attribute
/// positions, mirroring `flinter::EscapeHtml`.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}

fn format_duration(ns: i64) -> String {
    let s = ns / 1_000_000_000;
    if s < 60 {
        format!("{}s", s)
    } else {
        format!("{}m{}s", s / 60, s % 60)
    }
}

fn format_date(ns: i64) -> String {
    let (y, mo, d, _, _, _) = civil_from_ns(ns);
    format!("{:04}-{:02}-{:02}", y, mo, d)
}

fn format_time(ns: i64) -> String {
    let (_, _, _, h, mi, s) = civil_from_ns(ns);
    format!("{:02}:{:02}:{:02}", h, mi, s)
}

fn format_datetime(ns: i64) -> String {
    let (y, mo, d, h, mi, s) = civil_from_ns(ns);
    format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, mo, d, h, mi, s)
}

/// UTC calendar breakdown of a nanosecond timestamp. The digest is
/// rendered in UTC rather than the host's local zone -- the source used
/// `localtime_r`, but a server-side digest with no reliable notion of the
/// recipient's zone is better off showing an unambiguous UTC timestamp.
fn civil_from_ns(ns: i64) -> (i64, u32, u32, i64, i64, i64) {
    let total_seconds = ns.div_euclid(1_000_000_000);
    let days = total_seconds.div_euclid(86_400);
    let time_of_day = total_seconds.rem_euclid(86_400);
    let hour = time_of_day / 3600;
    let minute = (time_of_day % 3600) / 60;
    let second = time_of_day % 60;

    let (y, m, d) = civil_from_days(days);
    (y, m, d, hour, minute, second)
}

/// Inverse of `pdu::days_from_civil` (Howard Hinnant's `civil_from_days`).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn escapes_all_special_characters() {
        assert_eq!(escape_html("<b>A & \"B\"</b>"), "&lt;b&gt;A &amp; &quot;B&quot;&lt;/b&gt;");
    }

    #[test]
    fn render_digest_contains_one_row_pair_per_sms() {
        let entries = vec![DigestEntry::Sms {
            sent_ns: 1_000_000_000,
            received_ns: 2_000_000_000,
            peer: "+15551234567",
            body: "hello",
        }];
        let html = render_digest(&entries);
        assert!(html.contains("<table>"));
        assert!(html.contains("+15551234567"));
        assert!(html.contains("hello"));
    }

    #[test]
    fn civil_from_days_round_trips_days_from_civil() {
        // 2000-03-01 is day 11016 since epoch under the Hinnant algorithm.
        let (y, m, d) = civil_from_days(11_016);
        assert_eq!((y, m, d), (2000, 3, 1));
    }

    #[test]
    fn duration_formats_minutes_and_seconds() {
        assert_eq!(format_duration(65 * 1_000_000_000), "1m5s");
        assert_eq!(format_duration(30 * 1_000_000_000), "30s");
    }
}
