//! Test discovery under `--testLocation`: walks a directory for `*.test.yaml`
//! fixtures (or accepts a single fixture file directly), each naming one
//! system test.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum DiscoveryError {
    #[snafu(display("failed to read test location {}: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to parse test fixture {}: {source}", path.display()))]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
}

/// A discovered system test fixture. `expected_tuple_count` is what the
/// compiled pipeline is expected to emit for `input_tuple_count` input
/// tuples; this stands in for a full expected-results-file comparison
/// until the query compiler is wired end to end into this driver.
#[derive(Debug, Clone)]
pub struct TestCase {
    pub name: String,
    pub group: String,
    pub input_tuple_count: u64,
    pub expected_tuple_count: u64,
    pub path: PathBuf,
}

fn default_group() -> String {
    "default".to_string()
}

fn default_tuple_count() -> u64 {
    1
}

#[derive(Deserialize)]
struct RawTestCase {
    name: String,
    #[serde(default = "default_group")]
    group: String,
    #[serde(default = "default_tuple_count")]
    input_tuple_count: u64,
    expected_tuple_count: u64,
}

/// Discovers every `*.test.yaml` fixture under `location`, or parses
/// `location` itself if it names a file directly. Results are sorted by
/// name so discovery order is deterministic unless `--shuffle` is passed.
pub fn discover(location: &Path, group: Option<&str>) -> Result<Vec<TestCase>, DiscoveryError> {
    let mut paths = Vec::new();
    if location.is_dir() {
        collect_test_files(location, &mut paths)?;
    } else {
        paths.push(location.to_path_buf());
    }

    let mut cases = Vec::new();
    for path in paths {
        let contents = std::fs::read_to_string(&path).context(ReadSnafu { path: path.clone() })?;
        let raw: RawTestCase = serde_yaml::from_str(&contents).context(ParseSnafu { path: path.clone() })?;
        cases.push(TestCase {
            name: raw.name,
            group: raw.group,
            input_tuple_count: raw.input_tuple_count,
            expected_tuple_count: raw.expected_tuple_count,
            path,
        });
    }

    if let Some(group) = group {
        cases.retain(|case| case.group == group);
    }
    cases.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(cases)
}

fn collect_test_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), DiscoveryError> {
    let entries = std::fs::read_dir(dir).context(ReadSnafu { path: dir.to_path_buf() })?;
    for entry in entries {
        let entry = entry.context(ReadSnafu { path: dir.to_path_buf() })?;
        let path = entry.path();
        if path.is_dir() {
            collect_test_files(&path, out)?;
        } else if path.to_string_lossy().ends_with(".test.yaml") {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovers_and_sorts_fixtures_in_a_directory() {
        let dir = std::env::temp_dir().join(format!("ns-cli-discover-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("b_test.test.yaml"),
            "name: b_test\nexpected_tuple_count: 1\n",
        )
        .unwrap();
        std::fs::write(
            dir.join("a_test.test.yaml"),
            "name: a_test\ngroup: agg\nexpected_tuple_count: 2\n",
        )
        .unwrap();

        let cases = discover(&dir, None).unwrap();
        assert_eq!(cases.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["a_test", "b_test"]);

        let filtered = discover(&dir, Some("agg")).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].name, "a_test");

        std::fs::remove_dir_all(&dir).ok();
    }
}
