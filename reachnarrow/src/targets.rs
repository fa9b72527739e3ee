//! Patch-target mining: turns a vulnerability identifier into the set of
//! function names its fix touched.
//!
//! The chain walks OSV → CVE aliases → NVD references → GitHub pull/commit
//! diff, then mines the removed side of the diff for `def`/`cdef` names.
//! Network access happens behind [`Fetcher`], so tests inject documents and
//! production shells out the same way the dependency extractor does.

use std::process::Command;
use std::sync::OnceLock;

use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::error::Error;

/// Matches a `def`/`cdef` keyword and captures the defined name.
#[allow(clippy::expect_used)]
fn def_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^\w])c?def\s+([A-Za-z_][\w.]*)")
            .expect("hardcoded definition pattern compiles")
    })
}

/// Fetches a document by URL.
pub trait Fetcher {
    /// Returns the response body as text.
    fn get_text(&self, url: &str) -> Result<String, Error>;
}

/// Fetches through a `curl` subprocess.
pub struct CurlFetcher;

impl Fetcher for CurlFetcher {
    fn get_text(&self, url: &str) -> Result<String, Error> {
        let output = Command::new("curl")
            .args(["-sfL", url])
            .output()
            .map_err(|e| Error::FetchFailed {
                url: url.to_owned(),
                reason: e.to_string(),
            })?;
        if !output.status.success() {
            return Err(Error::FetchFailed {
                url: url.to_owned(),
                reason: format!("curl exited with {}", output.status),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Serves canned documents; the substitute fetcher for tests.
#[derive(Default)]
pub struct StaticFetcher {
    pages: FxHashMap<String, String>,
}

impl StaticFetcher {
    /// An empty page table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the body served for `url`.
    pub fn insert(&mut self, url: impl Into<String>, body: impl Into<String>) {
        self.pages.insert(url.into(), body.into());
    }
}

impl Fetcher for StaticFetcher {
    fn get_text(&self, url: &str) -> Result<String, Error> {
        self.pages.get(url).cloned().ok_or_else(|| Error::FetchFailed {
            url: url.to_owned(),
            reason: "no canned response".to_owned(),
        })
    }
}

/// Mines function names out of unified diff text.
pub struct PatchExtractor;

impl PatchExtractor {
    /// Names of every `def`/`cdef` whose declaration appears on the removed
    /// side of the patch. A hunk header's trailing context contributes a
    /// tentative enclosing definition, confirmed by the next removed line
    /// that is not itself a definition.
    pub fn find_targets_in_string(patch: &str) -> Vec<String> {
        struct PreLine {
            line: String,
            real: bool,
        }

        let mut pre_lines = Vec::new();
        for line in patch.lines() {
            let trimmed = line.trim_start_matches(' ');
            if let Some(removed) = trimmed.strip_prefix('-') {
                pre_lines.push(PreLine {
                    line: removed.to_owned(),
                    real: true,
                });
            }
            if trimmed.starts_with("@@ ") {
                if let Some(context) = trimmed.splitn(4, "@@").nth(2) {
                    pre_lines.push(PreLine {
                        line: context.trim_matches(' ').to_owned(),
                        real: false,
                    });
                }
            }
        }

        let mut discovered = Vec::new();
        let mut tentative: Option<String> = None;
        for pre in &pre_lines {
            let name = def_pattern()
                .captures(&pre.line)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_owned());
            if pre.real {
                if let Some(name) = name {
                    discovered.push(name);
                } else if let Some(pending) = tentative.take() {
                    discovered.push(pending);
                }
            } else if name.is_some() {
                tentative = name;
            }
        }
        discovered
    }
}

/// Produces target names for a vulnerability identifier.
pub trait TargetMiner {
    /// Patched function names associated with `vuln_id`. Empty when no
    /// usable patch reference exists.
    fn find_targets(&self, vuln_id: &str) -> Result<Vec<String>, Error>;
}

/// Walks OSV and NVD records down to a GitHub diff.
pub struct OsvMiner<F: Fetcher> {
    fetcher: F,
}

impl<F: Fetcher> OsvMiner<F> {
    /// Creates a miner over the given fetcher.
    pub fn new(fetcher: F) -> Self {
        Self { fetcher }
    }

    fn targets_from_nvd(&self, cve_id: &str) -> Result<Vec<String>, Error> {
        let url = format!(
            "https://services.nvd.nist.gov/rest/json/cve/1.0/{cve_id}?addOns=dictionaryCpes"
        );
        let body = self.fetcher.get_text(&url)?;
        let json: Value = serde_json::from_str(&body)?;

        let references = json
            .get("result")
            .and_then(|v| v.get("CVE_Items"))
            .and_then(Value::as_array)
            .and_then(|items| items.first())
            .and_then(|item| item.get("cve"))
            .and_then(|cve| cve.get("references"))
            .and_then(|refs| refs.get("reference_data"))
            .and_then(Value::as_array);

        if let Some(references) = references {
            for reference in references {
                let Some(url) = reference.get("url").and_then(Value::as_str) else {
                    continue;
                };
                if url.starts_with("https://github.com")
                    && (url.contains("/pull/") || url.contains("/commit/"))
                {
                    return self.targets_from_diff(url);
                }
            }
        }
        Ok(Vec::new())
    }

    fn targets_from_diff(&self, url: &str) -> Result<Vec<String>, Error> {
        let diff_url = if url.ends_with(".diff") {
            url.to_owned()
        } else {
            format!("{url}.diff")
        };
        let patch = self.fetcher.get_text(&diff_url)?;
        Ok(PatchExtractor::find_targets_in_string(&patch))
    }
}

impl<F: Fetcher> TargetMiner for OsvMiner<F> {
    fn find_targets(&self, vuln_id: &str) -> Result<Vec<String>, Error> {
        if vuln_id.starts_with("CVE-") {
            return self.targets_from_nvd(vuln_id);
        }

        let body = self
            .fetcher
            .get_text(&format!("https://api.osv.dev/v1/vulns/{vuln_id}"))?;
        let json: Value = serde_json::from_str(&body)?;
        if let Some(aliases) = json.get("aliases").and_then(Value::as_array) {
            for alias in aliases.iter().filter_map(Value::as_str) {
                if alias.starts_with("CVE-") {
                    return self.targets_from_nvd(alias);
                }
            }
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mines_removed_defs() {
        let patch = "\
--- a/x.py
+++ b/x.py
@@ -10,3 +10,3 @@
-def vulnerable(data):
+def vulnerable(data, safe=True):
     pass
";
        let targets = PatchExtractor::find_targets_in_string(patch);
        assert_eq!(targets, vec!["vulnerable".to_owned()]);
    }

    #[test]
    fn mines_cython_defs() {
        let patch = "-cdef parse_header(raw):\n";
        let targets = PatchExtractor::find_targets_in_string(patch);
        assert_eq!(targets, vec!["parse_header".to_owned()]);
    }

    #[test]
    fn hunk_context_confirms_enclosing_def() {
        let patch = "\
@@ -42,6 +42,7 @@ def full_load(stream):
-    return load(stream, FullLoader)
+    return load(stream, SafeLoader)
";
        let targets = PatchExtractor::find_targets_in_string(patch);
        assert_eq!(targets, vec!["full_load".to_owned()]);
    }

    #[test]
    fn hunk_context_without_removed_lines_yields_nothing() {
        let patch = "@@ -1,2 +1,2 @@ def untouched():\n+added = 1\n";
        let targets = PatchExtractor::find_targets_in_string(patch);
        assert!(targets.is_empty());
    }

    #[test]
    fn osv_walk_resolves_through_aliases() {
        let mut fetcher = StaticFetcher::new();
        fetcher.insert(
            "https://api.osv.dev/v1/vulns/PYSEC-2021-1",
            r#"{"aliases": ["GHSA-xyz", "CVE-2021-1"]}"#,
        );
        fetcher.insert(
            "https://services.nvd.nist.gov/rest/json/cve/1.0/CVE-2021-1?addOns=dictionaryCpes",
            r#"{"result": {"CVE_Items": [{"cve": {"references": {"reference_data": [
                {"url": "https://example.com/advisory"},
                {"url": "https://github.com/org/repo/pull/7"}
            ]}}}]}}"#,
        );
        fetcher.insert(
            "https://github.com/org/repo/pull/7.diff",
            "-def leaky(request):\n+def leaky(request, timeout):\n",
        );

        let miner = OsvMiner::new(fetcher);
        let targets = miner.find_targets("PYSEC-2021-1").unwrap();
        assert_eq!(targets, vec!["leaky".to_owned()]);
    }

    #[test]
    fn cve_ids_skip_the_osv_lookup() {
        let mut fetcher = StaticFetcher::new();
        fetcher.insert(
            "https://services.nvd.nist.gov/rest/json/cve/1.0/CVE-2022-2?addOns=dictionaryCpes",
            r#"{"result": {"CVE_Items": [{"cve": {"references": {"reference_data": [
                {"url": "https://github.com/org/repo/commit/abc123"}
            ]}}}]}}"#,
        );
        fetcher.insert(
            "https://github.com/org/repo/commit/abc123.diff",
            "-def handler(msg):\n",
        );

        let miner = OsvMiner::new(fetcher);
        let targets = miner.find_targets("CVE-2022-2").unwrap();
        assert_eq!(targets, vec!["handler".to_owned()]);
    }

    #[test]
    fn missing_references_mean_no_targets() {
        let mut fetcher = StaticFetcher::new();
        fetcher.insert("https://api.osv.dev/v1/vulns/GHSA-1", r#"{"id": "GHSA-1"}"#);
        let miner = OsvMiner::new(fetcher);
        assert!(miner.find_targets("GHSA-1").unwrap().is_empty());
    }
}
