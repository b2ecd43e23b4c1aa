//! Colorful console output for run metrics.

use num_format::{Locale, ToFormattedString};
use owo_colors::OwoColorize;
use std::time::Duration;

use crate::domain::Problem;

/// ASCII art banner for service startup.
pub fn print_banner() {
    let banner = r#"
  _____ _                _
 |_   _(_)_ __ ___   ___| |_   _
   | | | | '_ ` _ \ / _ \ | | | |
   | | | | | | | | |  __/ | |_| |
   |_| |_|_| |_| |_|\___|_|\__, |
                           |___/
"#;
    println!("{}", banner.cyan().bold());
    println!(
        "  {} {}\n",
        format!("v{}", env!("CARGO_PKG_VERSION")).bright_black(),
        "NEP Timetable Engine".bright_cyan()
    );
}

/// Prints the scenario scale when a run starts.
pub fn print_config(problem: &Problem) {
    println!(
        "{} {} {} Problem: sessions ({}), rooms ({}), faculty ({}), cohorts ({}), slots ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Solver]".bright_cyan(),
        problem.sessions.len().to_formatted_string(&Locale::en).bright_yellow(),
        problem.rooms.len().to_formatted_string(&Locale::en).bright_yellow(),
        problem.faculty.len().to_formatted_string(&Locale::en).bright_yellow(),
        problem.cohorts.len().to_formatted_string(&Locale::en).bright_yellow(),
        problem.slot_count().to_formatted_string(&Locale::en).bright_yellow()
    );

    let values = problem.rooms.len() * problem.slot_count();
    println!(
        "{} {} {} problem scale ({}), time budget ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Solver]".bright_cyan(),
        calculate_problem_scale(problem.sessions.len(), values).bright_magenta(),
        format_duration(problem.time_budget).yellow()
    );
}

/// Prints a phase end message with metrics.
pub fn print_phase_end(
    phase_name: &str,
    phase_index: usize,
    duration: Duration,
    steps_accepted: u64,
    moves_evaluated: u64,
    best_score: &str,
) {
    let moves_per_sec = if duration.as_secs_f64() > 0.0 {
        (moves_evaluated as f64 / duration.as_secs_f64()) as u64
    } else {
        0
    };
    let acceptance_rate = if moves_evaluated > 0 {
        (steps_accepted as f64 / moves_evaluated as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "{} {} {} {} phase ({}) ended: time spent ({}), best score ({}), move evaluation speed ({}/sec), step total ({}, {:.1}% accepted)",
        timestamp().bright_black(),
        "INFO".bright_green(),
        format!("[{}]", phase_name).bright_cyan(),
        phase_name.white().bold(),
        phase_index.to_string().yellow(),
        format_duration(duration).yellow(),
        format_score(best_score),
        moves_per_sec.to_formatted_string(&Locale::en).bright_magenta().bold(),
        steps_accepted.to_formatted_string(&Locale::en).white(),
        acceptance_rate
    );
}

/// Prints a step progress update with moves/sec prominently displayed.
pub fn print_step_progress(step: u64, elapsed: Duration, moves_evaluated: u64, score: &str) {
    let moves_per_sec = if elapsed.as_secs_f64() > 0.0 {
        (moves_evaluated as f64 / elapsed.as_secs_f64()) as u64
    } else {
        0
    };

    println!(
        "    {} Step {:>7} │ {} │ {}/sec │ {}",
        "→".bright_blue(),
        step.to_formatted_string(&Locale::en).white(),
        format!("{:>6}", format_duration(elapsed)).bright_black(),
        format!("{:>8}", moves_per_sec.to_formatted_string(&Locale::en))
            .bright_magenta()
            .bold(),
        format_score(score)
    );
}

/// Prints run completion summary.
pub fn print_solving_ended(
    total_duration: Duration,
    total_moves: u64,
    phase_count: usize,
    final_score: &str,
    is_feasible: bool,
) {
    let moves_per_sec = if total_duration.as_secs_f64() > 0.0 {
        (total_moves as f64 / total_duration.as_secs_f64()) as u64
    } else {
        0
    };

    println!(
        "{} {} {} Solving ended: time spent ({}), best score ({}), move evaluation speed ({}/sec), phase total ({})",
        timestamp().bright_black(),
        "INFO".bright_green(),
        "[Solver]".bright_cyan(),
        format_duration(total_duration).yellow(),
        format_score(final_score),
        moves_per_sec.to_formatted_string(&Locale::en).bright_magenta().bold(),
        phase_count.to_string().white()
    );

    // 60 chars wide, 56 char content area
    println!();
    println!("{}", "╔══════════════════════════════════════════════════════════╗".bright_cyan());

    let status_text = if is_feasible {
        "✓ FEASIBLE TIMETABLE FOUND"
    } else {
        "✗ INFEASIBLE (hard constraints violated)"
    };
    let status_colored = if is_feasible {
        status_text.bright_green().bold().to_string()
    } else {
        status_text.bright_red().bold().to_string()
    };
    let status_padding = 56 - status_text.chars().count();
    let left_pad = status_padding / 2;
    let right_pad = status_padding - left_pad;
    println!(
        "{}{}{}{}{}",
        "║".bright_cyan(),
        " ".repeat(left_pad),
        status_colored,
        " ".repeat(right_pad),
        "║".bright_cyan()
    );

    println!("{}", "╠══════════════════════════════════════════════════════════╣".bright_cyan());

    for (label, value) in [
        ("Final Score:", final_score.to_string()),
        ("Solving Time:", format!("{:.2}s", total_duration.as_secs_f64())),
        (
            "Move Speed:",
            format!("{}/sec", moves_per_sec.to_formatted_string(&Locale::en)),
        ),
    ] {
        println!(
            "{}  {:<18}{:>36}  {}",
            "║".bright_cyan(),
            label,
            value,
            "║".bright_cyan()
        );
    }

    println!("{}", "╚══════════════════════════════════════════════════════════╝".bright_cyan());
    println!();
}

/// Formats a duration nicely.
fn format_duration(d: Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        let mins = total_ms / 60_000;
        let secs = (total_ms % 60_000) / 1000;
        format!("{}m {}s", mins, secs)
    }
}

/// Colors a "Nhard/Xsoft" score: violations red, soft cost yellow.
fn format_score(score: &str) -> String {
    if let Some((hard, soft)) = score.split_once('/') {
        let hard = hard.trim_end_matches("hard");
        let soft = soft.trim_end_matches("soft");
        let hard_num: u64 = hard.parse().unwrap_or(0);
        let soft_num: f64 = soft.parse().unwrap_or(0.0);

        let hard_str = if hard_num > 0 {
            format!("{}hard", hard).bright_red().to_string()
        } else {
            format!("{}hard", hard).bright_green().to_string()
        };
        let soft_str = if soft_num > 0.0 {
            format!("{}soft", soft).yellow().to_string()
        } else {
            format!("{}soft", soft).bright_green().to_string()
        };
        return format!("{}/{}", hard_str, soft_str);
    }

    score.white().to_string()
}

/// Returns a timestamp string.
fn timestamp() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| format!("{}.{:03}", d.as_secs(), d.subsec_millis()))
        .unwrap_or_else(|_| "0.000".to_string())
}

/// Approximate search space: `value_count ^ entity_count`.
fn calculate_problem_scale(entity_count: usize, value_count: usize) -> String {
    if entity_count == 0 || value_count == 0 {
        return "0".to_string();
    }

    let log_scale = (entity_count as f64) * (value_count as f64).log10();
    let exponent = log_scale.floor() as i32;
    let mantissa = 10f64.powf(log_scale - exponent as f64);

    format!("{:.3} × 10^{}", mantissa, exponent)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_scale() {
        assert_eq!(calculate_problem_scale(0, 10), "0");
        assert_eq!(calculate_problem_scale(3, 10), "1.000 × 10^3");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
    }
}
