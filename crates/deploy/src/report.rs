//! Console summaries for deployment results.

use std::fmt;

use crate::confirm::TransactionOutcome;
use crate::record::{CompilationInfo, DeploymentInfo, DeploymentRecord};
use crate::verify::VerificationState;

// -- Display implementations for printing deployment reports --

impl fmt::Display for DeploymentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Deployment ===")?;
        writeln!(f, "  network:     {} (chain id {})", self.deployment.network, self.deployment.chain_id)?;
        writeln!(f, "  deployer:    {}", self.deployment.deployer_address)?;
        writeln!(f, "  tx hash:     {}", self.deployment.transaction_hash)?;
        write!(f, "  outcome:     ")?;
        match &self.outcome {
            TransactionOutcome::Confirmed {
                contract_address,
                gas_used,
                block_number,
            } => {
                writeln!(f, "confirmed")?;
                writeln!(f, "  contract:    {}", contract_address)?;
                writeln!(f, "  gas used:    {}", gas_used)?;
                writeln!(f, "  block:       {}", block_number)?;
            }
            TransactionOutcome::Reverted => writeln!(f, "REVERTED")?,
            TransactionOutcome::TimedOut => writeln!(f, "TIMED OUT")?,
        }
        if let Some(url) = &self.deployment.explorer_url {
            writeln!(f, "  explorer:    {}", url)?;
        }

        writeln!(f, "=== Compilation ===")?;
        writeln!(f, "  contract:    {}", self.compilation.contract_name)?;
        writeln!(f, "  compiler:    v{}", self.compilation.compiler_version)?;
        writeln!(
            f,
            "  optimizer:   {} ({} runs)",
            if self.compilation.optimization_enabled {
                "enabled"
            } else {
                "disabled"
            },
            self.compilation.optimization_runs
        )?;

        writeln!(f, "=== Verification ===")?;
        write!(f, "  state:       {}", verification_label(&self.verification.state))?;
        if let Some(guid) = &self.verification.submission_guid {
            write!(f, " (guid {}, {} checks)", guid, self.verification.attempts_made)?;
        }
        writeln!(f)?;
        if let Some(detail) = &self.verification.detail {
            writeln!(f, "  detail:      {}", detail)?;
        }

        for probe in &self.probes {
            writeln!(
                f,
                "  probe {}(): {}",
                probe.function,
                probe.output.as_deref().unwrap_or("<call failed>")
            )?;
        }

        Ok(())
    }
}

fn verification_label(state: &VerificationState) -> &'static str {
    match state {
        VerificationState::NotSubmitted => "not submitted",
        VerificationState::Submitted => "submitted",
        VerificationState::Pending => "pending",
        VerificationState::Verified => "verified",
        VerificationState::Failed => "failed",
        VerificationState::TimedOut => "timed out",
    }
}

/// Step-by-step explorer instructions for verifying by hand, printed when no
/// API key is configured. The settings must match the compilation exactly.
pub fn manual_verification_guide(
    deployment: &DeploymentInfo,
    compilation: &CompilationInfo,
    contract_address: &str,
) -> String {
    let explorer = deployment
        .explorer_url
        .as_deref()
        .unwrap_or("your block explorer");

    format!(
        "=== Manual verification ===\n\
         1. Open {explorer} and select the 'Contract' tab\n\
         2. Click 'Verify and Publish' for {contract_address}\n\
         3. Compiler type: Solidity (Single file)\n\
         4. Compiler version: v{version}\n\
         5. Optimization: {optimization} with {runs} runs\n\
         6. Paste the exact source saved in verification_source.sol\n\
         7. Leave constructor arguments empty unless you deployed with them\n",
        version = compilation.compiler_version,
        optimization = if compilation.optimization_enabled {
            "Yes"
        } else {
            "No"
        },
        runs = compilation.optimization_runs,
    )
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::record::ProbeResult;
    use crate::verify::VerificationSession;

    fn record(outcome: TransactionOutcome) -> DeploymentRecord {
        DeploymentRecord {
            deployment: DeploymentInfo {
                network: "bsc-testnet".to_string(),
                chain_id: 97,
                transaction_hash: "0xdeadbeef".to_string(),
                deployer_address: "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".to_string(),
                deployed_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
                explorer_url: None,
            },
            outcome,
            compilation: CompilationInfo {
                contract_name: "Token".to_string(),
                compiler_version: "0.8.19+commit.7dd6d404".to_string(),
                optimization_enabled: true,
                optimization_runs: 200,
                source_sha256: "ab".repeat(32),
                bytecode_keccak256: format!("0x{}", "cd".repeat(32)),
            },
            verification: VerificationSession::not_submitted(),
            probes: vec![ProbeResult {
                function: "name".to_string(),
                output: None,
            }],
            abi: serde_json::json!([]),
        }
    }

    #[test]
    fn test_confirmed_summary_contains_address() {
        let summary = record(TransactionOutcome::Confirmed {
            contract_address: "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string(),
            gas_used: 1000,
            block_number: 5,
        })
        .to_string();

        assert!(summary.contains("confirmed"));
        assert!(summary.contains("0x5fbdb2315678afecb367f032d93f642f64180aa3"));
        assert!(summary.contains("v0.8.19+commit.7dd6d404"));
        assert!(summary.contains("<call failed>"));
    }

    #[test]
    fn test_reverted_summary() {
        let summary = record(TransactionOutcome::Reverted).to_string();
        assert!(summary.contains("REVERTED"));
    }

    #[test]
    fn test_manual_guide_mentions_exact_settings() {
        let rec = record(TransactionOutcome::TimedOut);
        let guide = manual_verification_guide(
            &rec.deployment,
            &rec.compilation,
            "0x5fbdb2315678afecb367f032d93f642f64180aa3",
        );

        assert!(guide.contains("0x5fbdb2315678afecb367f032d93f642f64180aa3"));
        assert!(guide.contains("v0.8.19+commit.7dd6d404"));
        assert!(guide.contains("200 runs"));
        assert!(guide.contains("verification_source.sol"));
    }
}
