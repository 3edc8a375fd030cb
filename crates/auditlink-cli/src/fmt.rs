//! Terminal output formatting.

use std::io::{self, Write};

use auditlink_chain::{MintReceipt, MintedToken, OnChainRequestHandle};
use auditlink_core::{AuditResult, AuditStatus};
use auditlink_services::BadgeRecord;

use crate::orchestrator::Explanation;

pub fn write_audit_result(w: &mut impl Write, result: &AuditResult) -> io::Result<()> {
    writeln!(w, "  Status:   {}", status_str(result.status))?;
    if result.status == AuditStatus::Pending {
        writeln!(w, "  Score:    pending")?;
    } else {
        writeln!(w, "  Score:    {}/100", result.score)?;
    }
    if let Some(level) = &result.security_level {
        writeln!(w, "  Risk:     {level}")?;
    }
    if result.is_on_chain_audit {
        if let Some(id) = &result.on_chain_request_id {
            writeln!(w, "  Request:  {id}")?;
        }
        if let Some(tx) = &result.transaction_hash {
            writeln!(w, "  Tx:       {tx}")?;
        }
    }
    if let Some(report) = &result.on_chain_report {
        if let Some(gas) = report.gas_optimization_score {
            writeln!(w, "  Gas:      {gas}/100")?;
        }
        writeln!(
            w,
            "  Checks:   reentrancy {}, access control {}, input validation {}",
            yes_no(report.has_reentrancy_protection),
            yes_no(report.has_access_control),
            yes_no(report.has_input_validation),
        )?;
    }
    if !result.summary.is_empty() {
        writeln!(w, "\n{}", result.summary)?;
    }

    if !result.issues.is_empty() {
        writeln!(w, "\n{:<10} {:<30} DESCRIPTION", "SEVERITY", "ISSUE")?;
        for issue in &result.issues {
            let line = issue
                .line_number
                .map(|n| format!(" (line {n})"))
                .unwrap_or_default();
            writeln!(
                w,
                "{:<10} {:<30} {}{line}",
                issue.severity.as_str(),
                truncate(&issue.kind, 30),
                issue.description,
            )?;
        }
    }
    write_list(w, "Recommendations", &result.recommendations)?;
    if let Some(gas) = &result.gas_optimization {
        write_list(w, "Gas optimization", gas)?;
    }
    Ok(())
}

fn write_list(w: &mut impl Write, title: &str, items: &[String]) -> io::Result<()> {
    if items.is_empty() {
        return Ok(());
    }
    writeln!(w, "\n{title}:")?;
    for item in items {
        writeln!(w, "  - {item}")?;
    }
    Ok(())
}

pub fn write_explanation(w: &mut impl Write, explanation: &Explanation) -> io::Result<()> {
    match explanation {
        Explanation::NotRequested => Ok(()),
        Explanation::Ready(text) => writeln!(w, "\nAbout this contract:\n  {text}"),
        Explanation::Unavailable(reason) => {
            writeln!(w, "\nAbout this contract: explanation unavailable ({reason})")
        }
    }
}

pub fn write_handle(w: &mut impl Write, handle: &OnChainRequestHandle) -> io::Result<()> {
    writeln!(w, "  Contract: {}", handle.contract_address)?;
    writeln!(w, "  Network:  {}", handle.network)?;
    if handle.is_degraded() {
        writeln!(
            w,
            "  Warning:  request id was not found in the transaction logs; the id above is local only"
        )?;
    }
    Ok(())
}

pub fn write_mint_receipt(w: &mut impl Write, receipt: &MintReceipt, uri: &str) -> io::Result<()> {
    writeln!(w, "  Tx:       {}", receipt.transaction_hash)?;
    writeln!(w, "  Contract: {}", receipt.contract)?;
    writeln!(w, "  Network:  {}", receipt.network)?;
    match receipt.token_id {
        MintedToken::Known(id) => writeln!(w, "  Token:    #{id}")?,
        MintedToken::Unknown => writeln!(w, "  Token:    unknown (no mint event in receipt)")?,
    }
    writeln!(w, "  Metadata: {uri}")?;
    Ok(())
}

pub fn write_badges(w: &mut impl Write, badges: &[BadgeRecord]) -> io::Result<()> {
    if badges.is_empty() {
        return writeln!(w, "No badges found.");
    }
    writeln!(w, "{:<6} {:<7} {:<44} {:<12}", "ID", "SCORE", "CONTRACT", "MINTED")?;
    for badge in badges {
        let attr = |name: &str| {
            badge
                .attributes
                .iter()
                .find(|a| a.trait_type == name)
                .map_or("-", |a| a.value.as_str())
        };
        writeln!(
            w,
            "{:<6} {:<7} {:<44} {:<12}",
            badge.id,
            attr("Audit Score"),
            attr("Contract Address"),
            badge.minted_at.format("%Y-%m-%d"),
        )?;
    }
    writeln!(w, "\n{} badge(s)", badges.len())
}

const fn status_str(status: AuditStatus) -> &'static str {
    match status {
        AuditStatus::Pending => "pending",
        AuditStatus::Completed => "completed",
        AuditStatus::Failed => "failed",
    }
}

const fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
