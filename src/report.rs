use colored::*;
use std::path::Path;

use crate::ledger::Ledger;

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

/// Render the copy history: a compact table by default, one block per
/// record with `detailed`.
pub fn display_history(ledger: &Ledger, detailed: bool) {
    if ledger.is_empty() {
        println!("No files have been copied yet.");
        return;
    }

    println!("\n{}", "=".repeat(70));
    println!("TurboSort Copy History - {} files", ledger.len());
    println!("{}", "=".repeat(70));

    if detailed {
        for (_, record) in ledger.entries() {
            println!("\nSource: {}", record.source_path);
            println!("Destination: {}", record.destination_path);
            println!("Timestamp: {}", record.timestamp.to_rfc3339());
            println!(
                "Size: {} bytes ({:.2} KB)",
                record.size,
                record.size as f64 / 1024.0
            );
            println!("{}", "-".repeat(70));
        }
    } else {
        println!("{:<40} | {:<40} | {:<10}", "Source", "Destination", "Size");
        println!("{}-+-{}-+-{}", "-".repeat(40), "-".repeat(40), "-".repeat(10));
        for (_, record) in ledger.entries() {
            println!(
                "{:<40} | {:<40} | {:<7.2} KB",
                file_name(&record.source_path),
                file_name(&record.destination_path),
                record.size as f64 / 1024.0
            );
        }
    }

    let stats = ledger.stats();
    println!(
        "\nTotal: {} files, {:.2} MB",
        stats.total_files,
        stats.total_bytes as f64 / (1024.0 * 1024.0)
    );
    println!("{}\n", "=".repeat(70));
}

/// Aggregate statistics with a per-destination breakdown.
pub fn print_stats(ledger: &Ledger) {
    let stats = ledger.stats();

    println!("=== TurboSort Copy Statistics ===");
    println!(
        "Total files copied: {}",
        format!("{}", stats.total_files).green()
    );
    println!(
        "Total size: {}",
        format!("{:.2} MB", stats.total_bytes as f64 / (1024.0 * 1024.0)).green()
    );
    if !stats.per_destination.is_empty() {
        println!("Per destination:");
        for (dest, (files, bytes)) in &stats.per_destination {
            println!(
                "  {:<50} {} files, {:.2} MB",
                dest.cyan(),
                files,
                *bytes as f64 / (1024.0 * 1024.0)
            );
        }
    }
    println!("===============================");
}
