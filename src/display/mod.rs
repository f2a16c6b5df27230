//! Number formatting and the live status panel.

use tokio::sync::broadcast;

use crate::status::{StatusKey, StatusUpdate};

/// Format a dollar amount with thousands separators and two decimals,
/// "#,##0.00" style.
pub fn format_amount(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let whole = group_thousands(cents / 100);
    let formatted = format!("{}.{:02}", whole, cents % 100);
    if value < 0.0 && cents > 0 {
        format!("-{}", formatted)
    } else {
        formatted
    }
}

/// Format an integer count with thousands separators, "#,##0" style.
pub fn format_count(value: i64) -> String {
    let grouped = group_thousands(value.unsigned_abs());
    if value < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

const LABEL_WIDTH: usize = 13;
const INDENT: &str = "               ";

/// Accumulated view of the status stream, rendered as the fixed-row panel.
///
/// Most keys keep only their latest value. The narrative key appends, one
/// line per update, so the full story of the run stays visible.
#[derive(Clone, Debug, Default)]
pub struct StatusPanel {
    dsn: String,
    user: String,
    company: String,
    check_date: String,
    hours: String,
    amount: String,
    check_count: String,
    report_count: String,
    status_lines: Vec<String>,
}

impl StatusPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, update: &StatusUpdate) {
        let slot = match update.key {
            StatusKey::Dsn => &mut self.dsn,
            StatusKey::User => &mut self.user,
            StatusKey::Company => &mut self.company,
            StatusKey::CheckDate => &mut self.check_date,
            StatusKey::Hours => &mut self.hours,
            StatusKey::Amount => &mut self.amount,
            StatusKey::CheckCount => &mut self.check_count,
            StatusKey::ReportCount => &mut self.report_count,
            StatusKey::Status => {
                self.status_lines.push(update.message.clone());
                return;
            }
        };
        *slot = update.message.clone();
        if matches!(update.key, StatusKey::Hours | StatusKey::Amount) {
            self.align_totals();
        }
    }

    // Right-align the hours/amount pair so the decimal points line up.
    fn align_totals(&mut self) {
        let width = self.hours.len().max(self.amount.len());
        self.hours = format!("{:>width$}", self.hours, width = width);
        self.amount = format!("{:>width$}", self.amount, width = width);
    }

    fn row(key: StatusKey, value: &str) -> String {
        format!("{:<width$}: {}", key.as_str(), value, width = LABEL_WIDTH)
    }

    /// The full panel as text, one row per key in fixed order.
    pub fn render(&self) -> String {
        let mut out = Vec::new();
        out.push(Self::row(StatusKey::Dsn, &self.dsn));
        out.push(Self::row(StatusKey::User, &self.user));
        out.push(String::new());
        out.push(Self::row(StatusKey::Company, &self.company));
        out.push(Self::row(StatusKey::CheckDate, &self.check_date));
        out.push(String::new());
        out.push(Self::row(StatusKey::Hours, &self.hours));
        out.push(Self::row(StatusKey::Amount, &self.amount));
        out.push(String::new());
        out.push(Self::row(StatusKey::CheckCount, &self.check_count));
        out.push(String::new());
        out.push(Self::row(StatusKey::ReportCount, &self.report_count));
        out.push(String::new());
        match self.status_lines.split_first() {
            Some((first, rest)) => {
                out.push(Self::row(StatusKey::Status, first));
                for line in rest {
                    out.push(format!("{}{}", INDENT, line));
                }
            }
            None => out.push(Self::row(StatusKey::Status, "")),
        }
        out.join("\n")
    }
}

/// Follow a status stream until the bus closes, redrawing the panel on
/// every update. Returns the final panel so the caller can print it once
/// more after shutdown.
pub async fn run_live_panel(mut rx: broadcast::Receiver<StatusUpdate>) -> StatusPanel {
    use std::io::Write;

    let mut panel = StatusPanel::new();
    let mut stdout = std::io::stdout();
    loop {
        match rx.recv().await {
            Ok(update) => {
                panel.apply(&update);
                // Clear and redraw in place. Flush so the redraw is visible
                // even when stdout is not line-buffered.
                let _ = write!(stdout, "\x1b[2J\x1b[H{}\n", panel.render());
                let _ = stdout.flush();
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    panel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amounts_use_two_decimals_and_grouping() {
        assert_eq!(format_amount(0.0), "0.00");
        assert_eq!(format_amount(3.5), "3.50");
        assert_eq!(format_amount(1234.5), "1,234.50");
        assert_eq!(format_amount(1234567.891), "1,234,567.89");
        assert_eq!(format_amount(-1234.5), "-1,234.50");
    }

    #[test]
    fn counts_group_thousands() {
        assert_eq!(format_count(0), "0");
        assert_eq!(format_count(7), "7");
        assert_eq!(format_count(1234), "1,234");
        assert_eq!(format_count(-1234), "-1,234");
    }

    #[test]
    fn narrative_lines_accumulate() {
        let mut panel = StatusPanel::new();
        panel.apply(&StatusUpdate {
            key: StatusKey::Status,
            message: "Signing in...".to_string(),
        });
        panel.apply(&StatusUpdate {
            key: StatusKey::Status,
            message: "Sign-in complete".to_string(),
        });

        let rendered = panel.render();
        assert!(rendered.contains("Status       : Signing in..."));
        assert!(rendered.contains("               Sign-in complete"));
    }

    #[tokio::test]
    async fn live_panel_returns_the_final_view_when_the_stream_closes() {
        let (tx, rx) = broadcast::channel(16);
        let task = tokio::spawn(run_live_panel(rx));

        tx.send(StatusUpdate {
            key: StatusKey::Dsn,
            message: "PAYROLL01".to_string(),
        })
        .unwrap();
        tx.send(StatusUpdate {
            key: StatusKey::Status,
            message: "Database PAYROLL01 attached".to_string(),
        })
        .unwrap();
        drop(tx);

        let panel = task.await.unwrap();
        let rendered = panel.render();
        assert!(rendered.contains("Database     : PAYROLL01"));
        assert!(rendered.contains("Database PAYROLL01 attached"));
    }

    #[test]
    fn totals_pair_is_right_aligned() {
        let mut panel = StatusPanel::new();
        panel.apply(&StatusUpdate {
            key: StatusKey::Hours,
            message: "3.00".to_string(),
        });
        panel.apply(&StatusUpdate {
            key: StatusKey::Amount,
            message: "1,200.00".to_string(),
        });

        let rendered = panel.render();
        assert!(rendered.contains("Total Hours  :     3.00"));
        assert!(rendered.contains("Total Amount : 1,200.00"));
    }
}
