// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use tamperseal_kernel::status::{evaluate_pair, SecurityAssessment, SecurityStatus};

/// Classifies a reported fingerprint against the committed one.
pub fn run(current: Option<&str>, committed: Option<&str>) -> anyhow::Result<SecurityAssessment> {
    let assessment = evaluate_pair(current, committed);

    let badge = match assessment.status {
        SecurityStatus::Secure => "✅ SECURE",
        SecurityStatus::Breach => "❌ BREACH",
        SecurityStatus::Pending => "⏳ PENDING",
        SecurityStatus::NoData => "∅ NO DATA",
    };
    println!("\n{}\n", badge);
    println!("Reported:  {}", assessment.local.as_deref().unwrap_or("-"));
    println!("Committed: {}", assessment.committed.as_deref().unwrap_or("-"));
    println!("Match:     {}\n", assessment.matches);

    Ok(assessment)
}
