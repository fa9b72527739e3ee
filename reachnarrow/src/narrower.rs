//! SBOM narrowing: downgrades vulnerabilities whose patched functions are
//! unreachable from the application entry point.
//!
//! Two input formats are accepted and auto-detected. Rewriting happens at
//! the `serde_json::Value` level so unknown fields pass through untouched.

use std::path::PathBuf;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde_json::{json, Map, Value};

use crate::builder::CallGraphBuilder;
use crate::cvss;
use crate::deps::PydepsProvider;
use crate::error::Error;
use crate::targets::TargetMiner;

/// Answers "can any of these targets be reached from the entry point?".
pub trait Reachability {
    /// Runs one analysis against the target set.
    fn probe(&self, targets: &[String]) -> Result<bool, Error>;
}

/// Probes by building a fresh call graph per vulnerability.
pub struct GraphReachability {
    /// Entry file the analyses start from.
    pub entry: PathBuf,
    /// Directory levels the module fallback search may climb.
    pub module_backtrack: usize,
}

impl Reachability for GraphReachability {
    fn probe(&self, targets: &[String]) -> Result<bool, Error> {
        let mut builder = CallGraphBuilder::new(
            targets.iter().cloned(),
            Box::new(PydepsProvider),
            self.module_backtrack,
        )?;
        builder.build_from_entry(&self.entry)?;
        Ok(builder.detected())
    }
}

/// The two accepted SBOM shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SbomFormat {
    /// Object with a top-level `vulnerabilities` array carrying `id`,
    /// `analysis`, and `ratings`.
    Standard,
    /// Array of components carrying `vulnerabilities[].cve` and
    /// `.cvssScore`.
    Vendor,
}

/// Validates the input against both formats, standard first.
pub fn detect_format(value: &Value) -> Result<SbomFormat, Error> {
    if validate_standard(value).is_ok() {
        return Ok(SbomFormat::Standard);
    }
    validate_vendor(value).map_err(Error::SchemaValidation)?;
    Ok(SbomFormat::Vendor)
}

fn validate_standard(value: &Value) -> Result<(), String> {
    let obj = value
        .as_object()
        .ok_or_else(|| "document is not an object".to_owned())?;
    let vulns = obj
        .get("vulnerabilities")
        .and_then(Value::as_array)
        .ok_or_else(|| "missing vulnerabilities array".to_owned())?;
    for (idx, vuln) in vulns.iter().enumerate() {
        if vuln.get("id").and_then(Value::as_str).is_none() {
            return Err(format!("vulnerabilities[{idx}] has no string id"));
        }
    }
    Ok(())
}

fn validate_vendor(value: &Value) -> Result<(), String> {
    let components = value
        .as_array()
        .ok_or_else(|| "document is neither an SBOM object nor a component array".to_owned())?;
    for (idx, component) in components.iter().enumerate() {
        let obj = component
            .as_object()
            .ok_or_else(|| format!("component[{idx}] is not an object"))?;
        if obj.get("name").and_then(Value::as_str).is_none()
            || !obj.contains_key("version")
        {
            return Err(format!("component[{idx}] lacks name/version"));
        }
        let vulns = obj
            .get("vulnerabilities")
            .and_then(Value::as_array)
            .ok_or_else(|| format!("component[{idx}] lacks a vulnerabilities array"))?;
        for (vidx, vuln) in vulns.iter().enumerate() {
            if vuln.get("cve").and_then(Value::as_str).is_none()
                || vuln.get("cvssScore").and_then(Value::as_f64).is_none()
            {
                return Err(format!(
                    "component[{idx}].vulnerabilities[{vidx}] lacks cve/cvssScore"
                ));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Unreachable,
    Reachable,
    NoTargets,
}

/// Rewrites an SBOM using per-vulnerability reachability.
pub struct Narrower<'a> {
    miner: &'a (dyn TargetMiner + Sync),
    reach: &'a (dyn Reachability + Sync),
}

impl<'a> Narrower<'a> {
    /// Creates a narrower over a target miner and a reachability probe.
    pub fn new(
        miner: &'a (dyn TargetMiner + Sync),
        reach: &'a (dyn Reachability + Sync),
    ) -> Self {
        Self { miner, reach }
    }

    /// Parses, validates, and narrows `contents`, returning the rewritten
    /// document.
    pub fn narrow(&self, contents: &str) -> Result<Value, Error> {
        let mut value: Value = serde_json::from_str(contents)?;
        match detect_format(&value)? {
            SbomFormat::Standard => self.narrow_standard(&mut value)?,
            SbomFormat::Vendor => self.narrow_vendor(&mut value)?,
        }
        Ok(value)
    }

    /// Mines and probes each distinct vulnerability id once; analyses for
    /// distinct ids are independent, so they run in parallel.
    fn decide_all(&self, ids: &[String]) -> Result<FxHashMap<String, Decision>, Error> {
        let decisions: Result<Vec<(String, Decision)>, Error> = ids
            .par_iter()
            .map(|id| {
                let targets = self.miner.find_targets(id)?;
                let decision = if targets.is_empty() {
                    Decision::NoTargets
                } else if self.reach.probe(&targets)? {
                    Decision::Reachable
                } else {
                    Decision::Unreachable
                };
                Ok((id.clone(), decision))
            })
            .collect();
        Ok(decisions?.into_iter().collect())
    }

    fn narrow_standard(&self, value: &mut Value) -> Result<(), Error> {
        let ids = collect_unique(
            value
                .get("vulnerabilities")
                .and_then(Value::as_array)
                .map(|vulns| {
                    vulns
                        .iter()
                        .filter_map(|v| v.get("id").and_then(Value::as_str))
                })
                .into_iter()
                .flatten(),
        );
        let decisions = self.decide_all(&ids)?;

        let Some(vulns) = value.get_mut("vulnerabilities").and_then(Value::as_array_mut) else {
            return Ok(());
        };
        for vuln in vulns {
            let Some(id) = vuln.get("id").and_then(Value::as_str).map(ToOwned::to_owned) else {
                continue;
            };
            if decisions.get(&id) != Some(&Decision::Unreachable) {
                continue;
            }
            let Some(obj) = vuln.as_object_mut() else {
                continue;
            };

            let analysis = obj
                .entry("analysis")
                .or_insert_with(|| Value::Object(Map::new()));
            if let Some(analysis) = analysis.as_object_mut() {
                analysis.insert("state".to_owned(), json!("not_affected"));
                analysis.insert("justification".to_owned(), json!("code_not_reachable"));
            }

            let reduced = obj
                .get("ratings")
                .and_then(Value::as_array)
                .and_then(|ratings| ratings.first())
                .and_then(|rating| rating.get("vector"))
                .and_then(Value::as_str)
                .map(cvss::drop_severity)
                .transpose()?;
            if let Some(vector) = reduced {
                let today = chrono::Local::now().date_naive();
                let rating = json!({
                    "source": { "name": format!("reachnarrow run on {today}") },
                    "vector": vector,
                });
                if let Some(ratings) = obj.get_mut("ratings").and_then(Value::as_array_mut) {
                    ratings.push(rating);
                }
            }
        }
        Ok(())
    }

    fn narrow_vendor(&self, value: &mut Value) -> Result<(), Error> {
        let ids = collect_unique(
            value
                .as_array()
                .map(|components| {
                    components
                        .iter()
                        .filter_map(|c| c.get("vulnerabilities").and_then(Value::as_array))
                        .flatten()
                        .filter_map(|v| v.get("cve").and_then(Value::as_str))
                })
                .into_iter()
                .flatten(),
        );
        let decisions = self.decide_all(&ids)?;

        let Some(components) = value.as_array_mut() else {
            return Ok(());
        };
        for component in components {
            let Some(vulns) = component
                .get_mut("vulnerabilities")
                .and_then(Value::as_array_mut)
            else {
                continue;
            };
            for vuln in vulns {
                let Some(id) = vuln.get("cve").and_then(Value::as_str).map(ToOwned::to_owned)
                else {
                    continue;
                };
                if decisions.get(&id) != Some(&Decision::Unreachable) {
                    continue;
                }
                let Some(score) = vuln.get("cvssScore").and_then(Value::as_f64) else {
                    continue;
                };
                if let Some(obj) = vuln.as_object_mut() {
                    obj.insert("cvssScore".to_owned(), json!((score - 2.5).max(0.0)));
                }
            }
        }
        Ok(())
    }
}

fn collect_unique<'v>(ids: impl Iterator<Item = &'v str>) -> Vec<String> {
    let mut seen = rustc_hash::FxHashSet::default();
    let mut out = Vec::new();
    for id in ids {
        if seen.insert(id) {
            out.push(id.to_owned());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_format_is_detected_first() {
        let value = json!({"vulnerabilities": [{"id": "CVE-1"}]});
        assert_eq!(detect_format(&value).unwrap(), SbomFormat::Standard);
    }

    #[test]
    fn vendor_format_is_the_fallback() {
        let value = json!([{
            "name": "requests",
            "version": "2.0",
            "vulnerabilities": [{"cve": "CVE-1", "cvssScore": 9.8}]
        }]);
        assert_eq!(detect_format(&value).unwrap(), SbomFormat::Vendor);
    }

    #[test]
    fn unrecognized_documents_fail_validation() {
        let value = json!({"components": []});
        assert!(matches!(
            detect_format(&value),
            Err(Error::SchemaValidation(_))
        ));
    }
}
