//! Audit request and result model.
//!
//! An [`AuditResult`] is produced either synchronously by the direct
//! generative-AI path or progressively by the on-chain path, where a pending
//! placeholder (score 0) is updated in place once the on-chain report lands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::validate_address;
use crate::error::{Error, Result};
use crate::network::NetworkId;

/// Baseline score before severity penalties are applied.
pub const PERFECT_SCORE: u8 = 100;

/// What the user asked to audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditTarget {
    /// A deployed contract; audited through the on-chain compute path.
    Address(String),
    /// Raw Solidity source; audited directly by the generative-AI client.
    SourceCode(String),
}

/// Ephemeral audit request, discarded once a result or failure is delivered.
#[derive(Debug, Clone)]
pub struct AuditRequest {
    pub target: AuditTarget,
    pub network: NetworkId,
    pub requested_at: DateTime<Utc>,
}

impl AuditRequest {
    pub fn new(target: AuditTarget, network: NetworkId) -> Self {
        Self {
            target,
            network,
            requested_at: Utc::now(),
        }
    }

    /// Reject malformed input before any network call is made.
    pub fn validate(&self) -> Result<()> {
        match &self.target {
            AuditTarget::Address(addr) => validate_address(addr).map(|_| ()),
            AuditTarget::SourceCode(code) if code.trim().is_empty() => {
                Err(Error::InvalidInput("source code is empty".into()))
            }
            AuditTarget::SourceCode(_) => Ok(()),
        }
    }
}

/// Issue severity. Drives the score penalty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[serde(alias = "Low", alias = "LOW")]
    Low,
    #[serde(alias = "Medium", alias = "MEDIUM")]
    Medium,
    #[serde(alias = "High", alias = "HIGH")]
    High,
    #[serde(alias = "Critical", alias = "CRITICAL")]
    Critical,
}

impl Severity {
    /// Points subtracted from [`PERFECT_SCORE`] per issue of this severity.
    pub const fn penalty(self) -> u8 {
        match self {
            Self::Low => 2,
            Self::Medium => 5,
            Self::High => 15,
            Self::Critical => 25,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// A single finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: Severity,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
}

/// Severity-weighted score: 100 minus the summed penalties, floored at 0.
pub fn score_issues(issues: &[Issue]) -> u8 {
    let penalty: u32 = issues.iter().map(|i| u32::from(i.severity.penalty())).sum();
    let score = u32::from(PERFECT_SCORE).saturating_sub(penalty);
    u8::try_from(score).unwrap_or(PERFECT_SCORE)
}

/// Risk label for a score.
pub const fn security_level(score: u8) -> &'static str {
    match score {
        90.. => "Low Risk",
        75..=89 => "Medium Risk",
        50..=74 => "High Risk",
        _ => "Critical Risk",
    }
}

/// Lifecycle of a displayed result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// Structured payload written back on-chain by the decentralized compute job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnChainReport {
    pub score: u32,
    #[serde(default)]
    pub security_level: Option<String>,
    #[serde(default)]
    pub ai_summary: Option<String>,
    #[serde(default)]
    pub gas_optimization_score: Option<u32>,
    #[serde(default)]
    pub has_reentrancy_protection: bool,
    #[serde(default)]
    pub has_access_control: bool,
    #[serde(default)]
    pub has_input_validation: bool,
}

/// Audit outcome shown to the user and exported with `--output`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditResult {
    pub score: u8,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_optimization: Option<Vec<String>>,
    #[serde(default)]
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security_level: Option<String>,
    #[serde(default)]
    pub is_on_chain_audit: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_chain_request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_chain_report: Option<OnChainReport>,
    #[serde(default)]
    pub status: AuditStatus,
}

impl AuditResult {
    /// Final result for the direct path; score and risk label derive from the issues.
    pub fn from_findings(
        issues: Vec<Issue>,
        recommendations: Vec<String>,
        gas_optimization: Option<Vec<String>>,
        summary: String,
    ) -> Self {
        let score = score_issues(&issues);
        Self {
            score,
            issues,
            recommendations,
            gas_optimization,
            summary,
            security_level: Some(security_level(score).to_string()),
            status: AuditStatus::Completed,
            ..Self::default()
        }
    }

    /// Placeholder for a submitted on-chain request that has not resolved yet.
    ///
    /// `degraded_id` marks a locally generated request id (the acceptance
    /// event was not found in the receipt); polling such an id cannot succeed.
    pub fn pending_on_chain(request_id: String, transaction_hash: String, degraded_id: bool) -> Self {
        let mut recommendations = vec![
            "On-chain analysis in progress; results typically arrive within 30-60 seconds".to_string(),
        ];
        if degraded_id {
            recommendations.push(
                "Request id could not be read from the transaction logs; check the transaction on the explorer"
                    .to_string(),
            );
        }
        Self {
            score: 0,
            recommendations,
            summary: format!("On-chain audit submitted. Request ID: {request_id}"),
            security_level: Some("Analyzing on-chain".to_string()),
            is_on_chain_audit: true,
            on_chain_request_id: Some(request_id),
            transaction_hash: Some(transaction_hash),
            status: AuditStatus::Pending,
            ..Self::default()
        }
    }

    /// Fold a completed on-chain report into this result.
    pub fn apply_report(&mut self, report: &OnChainReport) {
        self.score = u8::try_from(report.score.min(u32::from(PERFECT_SCORE))).unwrap_or(PERFECT_SCORE);
        self.security_level = Some(
            report
                .security_level
                .clone()
                .unwrap_or_else(|| security_level(self.score).to_string()),
        );
        self.summary = report
            .ai_summary
            .clone()
            .unwrap_or_else(|| "On-chain AI analysis completed".to_string());
        self.recommendations.clear();
        if !report.has_reentrancy_protection {
            self.recommendations
                .push("Add reentrancy protection (checks-effects-interactions or a reentrancy guard)".into());
        }
        if !report.has_access_control {
            self.recommendations
                .push("Restrict privileged functions with explicit access control".into());
        }
        if !report.has_input_validation {
            self.recommendations
                .push("Validate external inputs before using them in state changes".into());
        }
        self.on_chain_report = Some(report.clone());
        self.status = AuditStatus::Completed;
    }

    /// Record a terminal failure reported by the compute network.
    pub fn mark_failed(&mut self, reason: &str) {
        self.summary = format!("On-chain audit failed: {reason}");
        self.security_level = None;
        self.status = AuditStatus::Failed;
    }

    /// Once terminal, polling for this result must stop.
    pub fn is_terminal(&self) -> bool {
        self.status != AuditStatus::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(severity: Severity) -> Issue {
        Issue {
            kind: "test".into(),
            severity,
            description: "d".into(),
            line_number: None,
        }
    }

    #[test]
    fn penalties_per_severity() {
        assert_eq!(score_issues(&[issue(Severity::Critical)]), 75);
        assert_eq!(score_issues(&[issue(Severity::High)]), 85);
        assert_eq!(score_issues(&[issue(Severity::Medium)]), 95);
        assert_eq!(score_issues(&[issue(Severity::Low)]), 98);
        assert_eq!(score_issues(&[]), 100);
    }

    #[test]
    fn penalties_sum() {
        let issues = [
            issue(Severity::Medium),
            issue(Severity::Medium),
            issue(Severity::Low),
        ];
        assert_eq!(score_issues(&issues), 88);
    }

    #[test]
    fn score_floors_at_zero() {
        let issues = vec![issue(Severity::Critical); 5];
        assert_eq!(score_issues(&issues), 0);
    }

    #[test]
    fn security_level_thresholds() {
        assert_eq!(security_level(100), "Low Risk");
        assert_eq!(security_level(90), "Low Risk");
        assert_eq!(security_level(89), "Medium Risk");
        assert_eq!(security_level(75), "Medium Risk");
        assert_eq!(security_level(74), "High Risk");
        assert_eq!(security_level(50), "High Risk");
        assert_eq!(security_level(49), "Critical Risk");
        assert_eq!(security_level(0), "Critical Risk");
    }

    #[test]
    fn severity_accepts_capitalized_names() {
        let s: Severity = serde_json::from_str("\"High\"").unwrap();
        assert_eq!(s, Severity::High);
        assert!(serde_json::from_str::<Severity>("\"informational\"").is_err());
    }

    #[test]
    fn issue_uses_type_key() {
        let json = r#"{"type":"Reentrancy","severity":"critical","description":"x","lineNumber":12}"#;
        let parsed: Issue = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.kind, "Reentrancy");
        assert_eq!(parsed.line_number, Some(12));
    }

    #[test]
    fn request_validation() {
        let ok = AuditRequest::new(
            AuditTarget::Address("0x742d35Cc69C92cF4D3E72aA99Af1E4f7D4b8A6E9".into()),
            NetworkId::Sepolia,
        );
        assert!(ok.validate().is_ok());

        let bad = AuditRequest::new(AuditTarget::Address("0x1234".into()), NetworkId::Sepolia);
        assert!(matches!(bad.validate(), Err(Error::InvalidAddress(_))));

        let empty = AuditRequest::new(AuditTarget::SourceCode("   ".into()), NetworkId::Sepolia);
        assert!(matches!(empty.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn pending_placeholder_is_not_terminal() {
        let r = AuditResult::pending_on_chain("0xabc".into(), "0xdef".into(), false);
        assert_eq!(r.score, 0);
        assert_eq!(r.status, AuditStatus::Pending);
        assert!(!r.is_terminal());
        assert!(r.is_on_chain_audit);
    }

    #[test]
    fn degraded_placeholder_mentions_missing_event() {
        let r = AuditResult::pending_on_chain("0xabc".into(), "0xdef".into(), true);
        assert_eq!(r.recommendations.len(), 2);
    }

    #[test]
    fn apply_report_completes_result() {
        let mut r = AuditResult::pending_on_chain("0xabc".into(), "0xdef".into(), false);
        let report = OnChainReport {
            score: 82,
            security_level: Some("Medium".into()),
            ai_summary: Some("Looks fine".into()),
            gas_optimization_score: Some(70),
            has_reentrancy_protection: true,
            has_access_control: false,
            has_input_validation: true,
        };
        r.apply_report(&report);
        assert_eq!(r.score, 82);
        assert_eq!(r.status, AuditStatus::Completed);
        assert_eq!(r.summary, "Looks fine");
        assert_eq!(r.recommendations.len(), 1);
        assert!(r.is_terminal());
    }

    #[test]
    fn explicit_zero_score_is_terminal() {
        let mut r = AuditResult::pending_on_chain("0xabc".into(), "0xdef".into(), false);
        let report: OnChainReport = serde_json::from_str(r#"{"score":0}"#).unwrap();
        r.apply_report(&report);
        assert_eq!(r.score, 0);
        assert_eq!(r.status, AuditStatus::Completed);
        assert_eq!(r.security_level.as_deref(), Some("Critical Risk"));
    }

    #[test]
    fn report_score_is_clamped() {
        let mut r = AuditResult::default();
        let report: OnChainReport = serde_json::from_str(r#"{"score":250}"#).unwrap();
        r.apply_report(&report);
        assert_eq!(r.score, 100);
    }

    #[test]
    fn report_requires_score() {
        assert!(serde_json::from_str::<OnChainReport>(r#"{"securityLevel":"High"}"#).is_err());
    }

    #[test]
    fn direct_result_scores_findings() {
        let r = AuditResult::from_findings(
            vec![issue(Severity::High)],
            vec![],
            None,
            "summary".into(),
        );
        assert_eq!(r.score, 85);
        assert_eq!(r.security_level.as_deref(), Some("Medium Risk"));
        assert!(!r.is_on_chain_audit);
        assert!(r.is_terminal());
    }
}
