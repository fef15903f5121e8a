// src/sources/cve_history.rs
//! NVD change-history records and the significance filter deciding which
//! change details are worth surfacing for a MODIFIED alarm. The filter is a
//! pure function over structured diff records: same input list in, same
//! output list out, same order — network state never enters the picture.

use serde::{Deserialize, Serialize};

/// Response shape of the cvehistory 2.0 endpoint (subset we consume).
#[derive(Debug, Clone, Deserialize)]
pub struct CveHistoryResponse {
    #[serde(rename = "cveChanges", default)]
    pub cve_changes: Vec<ChangeWrapper>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeWrapper {
    pub change: CveChange,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CveChange {
    pub cve_id: String,
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub details: Vec<ChangeDetail>,
}

/// One structured diff record. `kind`/`action` stay plain strings: NVD adds
/// new type names over time and an unknown value must degrade to "no reasons
/// matched", never to a parse failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeDetail {
    #[serde(default)]
    pub action: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "oldValue", default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(rename = "newValue", default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
}

/// Why a change detail was kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetailReason {
    CvssUpdated,
    CpeChanged,
    ConfigChanged,
    CweChanged,
    DescriptionUpdated,
    ExploitReferenceAdded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignificantDetail {
    pub detail: ChangeDetail,
    pub reasons: Vec<DetailReason>,
}

/// Product policy knobs for the filter. The reason taxonomy is fixed; the
/// exploit-reference heuristic is a keyword list and therefore data.
#[derive(Debug, Clone, Deserialize)]
pub struct SignificanceConfig {
    pub exploit_url_hints: Vec<String>,
}

impl Default for SignificanceConfig {
    fn default() -> Self {
        Self {
            exploit_url_hints: [
                "exploit",
                "poc",
                "metasploit",
                "packetstorm",
                "0day",
                "weaponiz",
                "github.com", // PoC repos mostly live here
                "gist.github.com",
            ]
            .into_iter()
            .map(str::to_string)
            .collect(),
        }
    }
}

fn has_diff(d: &ChangeDetail) -> bool {
    if d.action != "Updated" {
        return false;
    }
    let old_v = d.old_value.as_deref().unwrap_or("").trim();
    let new_v = d.new_value.as_deref().unwrap_or("").trim();
    !new_v.is_empty() && old_v != new_v
}

fn looks_like_exploit_ref(d: &ChangeDetail, cfg: &SignificanceConfig) -> bool {
    if d.kind != "Reference" || d.action != "Added" {
        return false;
    }
    let v = d.new_value.as_deref().unwrap_or("").to_lowercase();
    cfg.exploit_url_hints.iter().any(|hint| v.contains(hint))
}

/// Keep only the details worth alerting on, tagged with the reasons.
///
/// Policy (matching the fixed taxonomy):
/// 1. CVSS vectors that actually changed value (Updated with a real diff).
/// 2. Affected-configuration changes: CPE / Configuration Added or Updated.
/// 3. Weakness classification (CWE) Added or Updated.
/// 4. Description Updated — Added is new-registration noise and is skipped.
/// 5. Reference Added whose URL smells like an exploit/PoC.
pub fn filter_significant_details(
    details: &[ChangeDetail],
    cfg: &SignificanceConfig,
) -> Vec<SignificantDetail> {
    let mut out = Vec::new();

    for d in details {
        let mut reasons = Vec::new();

        if d.kind.starts_with("CVSS") && has_diff(d) {
            reasons.push(DetailReason::CvssUpdated);
        }

        if (d.kind == "CPE" || d.kind == "Configuration")
            && (d.action == "Updated" || d.action == "Added")
        {
            reasons.push(if d.kind == "CPE" {
                DetailReason::CpeChanged
            } else {
                DetailReason::ConfigChanged
            });
        }

        if d.kind == "CWE" && (d.action == "Added" || d.action == "Updated") {
            reasons.push(DetailReason::CweChanged);
        }

        if d.kind == "Description" && d.action == "Updated" {
            reasons.push(DetailReason::DescriptionUpdated);
        }

        if looks_like_exploit_ref(d, cfg) {
            reasons.push(DetailReason::ExploitReferenceAdded);
        }

        if !reasons.is_empty() {
            out.push(SignificantDetail {
                detail: d.clone(),
                reasons,
            });
        }
    }

    out
}
