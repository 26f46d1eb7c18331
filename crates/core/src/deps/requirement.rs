//! `requirements.txt` parsing and the critical-dependency protection policy
//! (§4.F, §8 invariant 5).

use super::critical::CriticalPackages;

const OPS: &[&str] = &[">=", "==", "<=", "!=", "~=", ">", "<"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub name: String,
    pub op: Option<String>,
    pub version: Option<String>,
    pub raw: String,
}

/// Parses one `requirements.txt` line. Returns `None` for blank lines and
/// comments. Accepts `name`, and `name[op]version` for ops in
/// `>=,==,<=,>,<,!=,~=`.
pub fn parse_line(line: &str) -> Option<Requirement> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    // Strip inline comments (" # ...") but keep anything before it.
    let trimmed = trimmed.split(" #").next().unwrap_or(trimmed).trim();
    if trimmed.is_empty() {
        return None;
    }

    for op in OPS {
        if let Some(idx) = trimmed.find(op) {
            let name = trimmed[..idx].trim().to_string();
            let version = trimmed[idx + op.len()..].trim().to_string();
            if name.is_empty() {
                continue;
            }
            return Some(Requirement {
                name,
                op: Some((*op).to_string()),
                version: Some(version),
                raw: trimmed.to_string(),
            });
        }
    }

    Some(Requirement {
        name: trimmed.to_string(),
        op: None,
        version: None,
        raw: trimmed.to_string(),
    })
}

pub fn parse_requirements(text: &str) -> Vec<Requirement> {
    text.lines().filter_map(parse_line).collect()
}

/// Outcome of running the dependency-protection policy over a parsed
/// requirements file (§4.F decision table).
#[derive(Debug, Clone)]
pub struct InstallPlan {
    /// Lines safe to hand to the package installer, verbatim.
    pub to_install: Vec<String>,
    /// Critical packages that were skipped because already installed.
    pub protected: Vec<String>,
}

/// `already_installed` should report whether a package name is already
/// present in the backend's environment, regardless of version — critical
/// packages are never upgraded once present, only installed if missing.
pub fn plan_install<F>(
    requirements: &[Requirement],
    critical: &CriticalPackages,
    mut already_installed: F,
) -> InstallPlan
where
    F: FnMut(&str) -> bool,
{
    let mut to_install = Vec::new();
    let mut protected = Vec::new();

    for req in requirements {
        if critical.contains(&req.name) {
            if already_installed(&req.name) {
                protected.push(req.name.clone());
                continue;
            }
        }
        to_install.push(req.raw.clone());
    }

    InstallPlan { to_install, protected }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_lines_and_comments_are_ignored() {
        let reqs = parse_requirements("\n# a comment\n\nrequests==2.0\n");
        assert_eq!(reqs.len(), 1);
        assert_eq!(reqs[0].name, "requests");
    }

    #[test]
    fn parses_each_supported_operator() {
        for op in [">=", "==", "<=", "!=", "~=", ">", "<"] {
            let line = format!("pkg{op}1.0");
            let req = parse_line(&line).unwrap();
            assert_eq!(req.name, "pkg");
            assert_eq!(req.op.as_deref(), Some(op));
            assert_eq!(req.version.as_deref(), Some("1.0"));
        }
    }

    #[test]
    fn bare_name_has_no_version() {
        let req = parse_line("numpy").unwrap();
        assert_eq!(req.name, "numpy");
        assert!(req.op.is_none());
    }

    #[test]
    fn critical_package_already_installed_is_protected_not_upgraded() {
        let critical = CriticalPackages::default();
        let reqs = parse_requirements("torch==2.5.0\nrequests==2.0\n");
        let plan = plan_install(&reqs, &critical, |name| name == "torch");
        assert_eq!(plan.protected, vec!["torch".to_string()]);
        assert_eq!(plan.to_install, vec!["requests==2.0".to_string()]);
    }

    #[test]
    fn critical_package_not_yet_installed_is_installed() {
        let critical = CriticalPackages::default();
        let reqs = parse_requirements("torch==2.5.0\n");
        let plan = plan_install(&reqs, &critical, |_| false);
        assert!(plan.protected.is_empty());
        assert_eq!(plan.to_install, vec!["torch==2.5.0".to_string()]);
    }

    #[test]
    fn non_critical_packages_always_pass_through() {
        let critical = CriticalPackages::default();
        let reqs = parse_requirements("requests==2.0\npyyaml>=6.0\n");
        let plan = plan_install(&reqs, &critical, |_| true);
        assert_eq!(plan.to_install.len(), 2);
        assert!(plan.protected.is_empty());
    }
}
