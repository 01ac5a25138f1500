//! Plain-text league reports
//!
//! Reports only read what the delta engine already put on each snapshot
//! (`weekly_xp`, `weekly_xp_per_language`, ...); nothing is recomputed here.

use std::cmp::Reverse;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};

use crate::domain::{AccountMap, AccountRecord, AccountSnapshot, Goals};

const MEDALS: [&str; 3] = ["🥇", "🥈", "🥉"];

/// Which report is being produced; also names the output file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    Daily,
    Weekly,
}

impl ReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Daily => "daily",
            ReportKind::Weekly => "weekly",
        }
    }
}

/// One ranked account
#[derive(Debug, Clone, Copy)]
pub struct LeaderboardRow<'a> {
    pub name: &'a str,
    pub snapshot: &'a AccountSnapshot,
}

/// Rank accounts with usable data: streak, then weekly XP, then total XP
///
/// Ties keep the map's (alphabetical) order.
pub fn leaderboard(results: &AccountMap) -> Vec<LeaderboardRow<'_>> {
    let mut rows: Vec<LeaderboardRow<'_>> = results
        .iter()
        .filter_map(|(name, record)| {
            record.snapshot().map(|snapshot| LeaderboardRow {
                name: name.as_str(),
                snapshot,
            })
        })
        .collect();

    rows.sort_by_key(|row| {
        Reverse((
            row.snapshot.streak,
            row.snapshot.weekly_xp,
            row.snapshot.total_xp,
        ))
    });
    rows
}

fn rank_label(position: usize) -> String {
    MEDALS
        .get(position)
        .map(|medal| medal.to_string())
        .unwrap_or_else(|| format!("{}.", position + 1))
}

/// `1234567` as `1,234,567`
pub fn format_thousands(value: u64) -> String {
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

fn weekly_gains(snapshot: &AccountSnapshot) -> String {
    let gains: Vec<String> = snapshot
        .weekly_xp_per_language
        .iter()
        .filter(|(_, xp)| **xp > 0)
        .map(|(category, xp)| format!("{} +{}", category, xp))
        .collect();

    if gains.is_empty() {
        String::new()
    } else {
        format!(" ({})", gains.join(", "))
    }
}

fn failures(results: &AccountMap) -> Vec<(&str, &str)> {
    results
        .iter()
        .filter_map(|(name, record)| record.error().map(|error| (name.as_str(), error)))
        .collect()
}

/// Short daily update: top three, streak alerts, failed checks
pub fn daily_report(results: &AccountMap, report_date: NaiveDate) -> String {
    let mut lines = vec![
        "📊 DUOLINGO FAMILY LEAGUE - DAILY UPDATE".to_string(),
        "=".repeat(45),
        format!("Date: {}", report_date.format("%Y-%m-%d")),
        String::new(),
        "🏆 Today's Standings:".to_string(),
    ];

    for (position, row) in leaderboard(results).iter().take(3).enumerate() {
        lines.push(format!(
            "{} {}: {} day streak | {} weekly XP{}",
            rank_label(position),
            row.name,
            row.snapshot.streak,
            row.snapshot.weekly_xp,
            weekly_gains(row.snapshot)
        ));
    }

    lines.push(String::new());
    lines.push("⚠️ Streak Alerts:".to_string());

    let alerts: Vec<String> = results
        .iter()
        .filter_map(|(name, record)| match record {
            AccountRecord::Snapshot(snapshot) if snapshot.streak == 0 => {
                Some(format!("  • {} needs to practice today!", name))
            }
            _ => None,
        })
        .collect();

    if alerts.is_empty() {
        lines.push("  ✅ Everyone is maintaining their streaks!".to_string());
    } else {
        lines.extend(alerts);
    }

    let failed = failures(results);
    if !failed.is_empty() {
        lines.push(String::new());
        lines.push("❌ Could not check:".to_string());
        for (name, error) in failed {
            lines.push(format!("  • {}: {}", name, error));
        }
    }

    lines.push(String::new());
    lines.push("Keep learning! 🌟".to_string());
    lines.join("\n")
}

/// Full weekly report: leaderboard, per-account detail against goals
pub fn weekly_report(
    results: &AccountMap,
    goals: &Goals,
    week_ending: NaiveDate,
    generated_at: NaiveDateTime,
) -> String {
    let mut lines = vec![
        "🏆 DUOLINGO FAMILY LEAGUE - WEEKLY REPORT".to_string(),
        "=".repeat(55),
        format!("Week ending: {}", week_ending.format("%Y-%m-%d")),
        format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S")),
        String::new(),
        "🥇 FAMILY LEADERBOARD".to_string(),
        "-".repeat(25),
    ];

    for (position, row) in leaderboard(results).iter().enumerate() {
        lines.push(format!("{} {}", rank_label(position), row.name));
        lines.push(format!(
            "    Streak: {} days | Weekly XP: {} | Total XP: {}",
            row.snapshot.streak,
            row.snapshot.weekly_xp,
            format_thousands(row.snapshot.total_xp)
        ));
    }

    lines.push(String::new());
    lines.push("📊 DETAILED PROGRESS".to_string());
    lines.push("-".repeat(22));

    for (name, record) in results {
        match record.snapshot() {
            Some(snapshot) => push_account_detail(&mut lines, name, snapshot, goals),
            None => {
                lines.push(String::new());
                lines.push(format!("👤 {}", name));
                lines.push(format!(
                    "   ❌ Unable to check progress: {}",
                    record.error().unwrap_or("unknown error")
                ));
            }
        }
    }

    lines.push(String::new());
    lines.push("🎯 THIS WEEK'S FAMILY GOALS".to_string());
    lines.push("-".repeat(30));
    lines.push(format!("• Maintain a {}-day streak", goals.streak_goal));
    lines.push(format!("• Earn {} XP this week", goals.weekly_xp_goal));
    lines.push("• Try to beat your personal best!".to_string());
    lines.push(String::new());
    lines.push("Keep up the great work, everyone! 🌟".to_string());
    lines.join("\n")
}

fn push_account_detail(lines: &mut Vec<String>, name: &str, snapshot: &AccountSnapshot, goals: &Goals) {
    lines.push(String::new());
    lines.push(format!("👤 {} ({})", name, snapshot.username));
    lines.push(format!("   Current streak: {} days", snapshot.streak));

    if snapshot.streak >= goals.streak_goal {
        lines.push("   🔥 STREAK GOAL ACHIEVED!".to_string());
    } else if snapshot.streak >= goals.streak_goal / 2 {
        lines.push(format!("   ⚡ Good progress towards {}-day goal", goals.streak_goal));
    } else {
        lines.push(format!("   ⚠️  Work needed for {}-day streak goal", goals.streak_goal));
    }

    if snapshot.weekly_xp >= goals.weekly_xp_goal {
        lines.push(format!(
            "   🎯 WEEKLY XP GOAL ACHIEVED! ({}/{})",
            snapshot.weekly_xp, goals.weekly_xp_goal
        ));
    } else {
        lines.push(format!(
            "   📈 Weekly XP progress: {}/{}",
            snapshot.weekly_xp, goals.weekly_xp_goal
        ));
    }

    if !snapshot.language_progress.is_empty() {
        lines.push("   📚 Language Progress:".to_string());
        for (category, progress) in &snapshot.language_progress {
            if progress.xp == 0 {
                lines.push(format!("      {}: Not started yet", category));
                continue;
            }

            let gained = snapshot
                .weekly_xp_per_language
                .get(category)
                .copied()
                .unwrap_or(0);
            let suffix = if gained > 0 {
                format!(" (+{} this week)", gained)
            } else {
                String::new()
            };
            lines.push(format!(
                "      {}: Level {} | {} XP{}",
                category,
                progress.level,
                format_thousands(progress.xp),
                suffix
            ));
        }
    } else if !snapshot.active_languages.is_empty() {
        lines.push(format!(
            "   📚 Active Languages: {}",
            snapshot.active_languages.join(", ")
        ));
    }
}

/// Path a report for `date` is written to
pub fn report_path(dir: &Path, kind: ReportKind, date: NaiveDate) -> PathBuf {
    dir.join(format!("{}_report_{}.txt", kind.as_str(), date.format("%Y%m%d")))
}

/// Write a rendered report, creating the directory if needed
pub async fn write_report(
    dir: &Path,
    kind: ReportKind,
    date: NaiveDate,
    contents: &str,
) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = report_path(dir, kind, date);
    tokio::fs::write(&path, contents).await?;

    tracing::info!("{} report saved to {}", kind.as_str(), path.display());
    Ok(path)
}
