use crate::database::models::{Ledger, PeriodKey, RosterMember};

pub const QUOTA_MET_MARK: &str = "✓";

pub const DISCORD_MESSAGE_LIMIT: usize = 2000;

/// Renders the weekly compliance report for `roster`, in roster order.
/// Returns `None` when there is nobody to report on.
pub fn generate_report(
    ledger: &Ledger,
    period: &PeriodKey,
    roster: &[RosterMember],
    required_count: u32,
    tag_underperformers: bool,
) -> Option<String> {
    if roster.is_empty() {
        return None;
    }

    let mut report = format!("**[Weekly Sync Report]** week of {}\n\n", period);
    let mut under_quota = Vec::new();

    for member in roster {
        let count = ledger
            .record(period, &member.user_id.to_string())
            .map(|record| record.count)
            .unwrap_or(0);

        report.push_str(&format!(
            "- {}: {}/{}",
            member.display_name, count, required_count
        ));
        if count >= required_count {
            report.push(' ');
            report.push_str(QUOTA_MET_MARK);
        } else {
            under_quota.push(member);
        }
        report.push('\n');
    }

    if under_quota.is_empty() {
        report.push_str("\n🎉 Everyone reached the weekly quota!");
    } else if tag_underperformers {
        let mentions: Vec<String> = under_quota
            .iter()
            .map(|member| mention(member.user_id))
            .collect();
        report.push_str(&format!(
            "\n⚠️ Below quota ({}): {}",
            required_count,
            mentions.join(" ")
        ));
    }

    Some(report.trim_end().to_string())
}

/// Raw tally of everyone who posted this period, highest count first.
pub fn format_count_summary(ledger: &Ledger, period: &PeriodKey) -> String {
    let mut rows: Vec<(&str, u32)> = ledger
        .period(period)
        .map(|users| {
            users
                .values()
                .map(|record| (record.name.as_str(), record.count))
                .collect()
        })
        .unwrap_or_default();

    rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let body = if rows.is_empty() {
        "- (no data)".to_string()
    } else {
        rows.iter()
            .map(|(name, count)| format!("- {}: {}", name, count))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!("**[Weekly Sync Count]** week of {}\n\n{}", period, body)
}

/// Splits `text` on line boundaries into pieces of at most `limit` bytes.
/// A single line longer than `limit` is cut at char boundaries.
pub fn chunk_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    // Tracked separately from `current.is_empty()` so a blank first line
    // still gets its separator.
    let mut started = false;

    for line in text.lines() {
        if started && current.len() + 1 + line.len() > limit {
            chunks.push(std::mem::take(&mut current));
            started = false;
        }

        let mut rest = line;
        while rest.len() > limit {
            let mut cut = limit;
            while !rest.is_char_boundary(cut) {
                cut -= 1;
            }
            chunks.push(rest[..cut].to_string());
            rest = &rest[cut..];
        }

        if started {
            current.push('\n');
        }
        current.push_str(rest);
        started = true;
    }

    if started {
        chunks.push(current);
    }
    chunks
}

pub fn mention(user_id: u64) -> String {
    format!("<@{}>", user_id)
}

pub fn format_error_message(error: &str) -> String {
    format!("❌ **Error**: {}", error)
}

pub fn format_success_message(message: &str) -> String {
    format!("✅ {}", message)
}

pub fn format_info_message(message: &str) -> String {
    format!("ℹ️ {}", message)
}
