//! Compiled-pipeline cache file format (spec.md §6): a serialized
//! `SerializableDecomposedQueryPlan`, extension `.pb`, file name
//! `<testName>_<index>.pb`. Used by the system test driver's
//! `--generateCache`/`--useCache` flags to skip query compilation on
//! repeat runs of the same test.

use std::path::{Path, PathBuf};

use prost::Message;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum CacheError {
    #[snafu(display("failed to read cache file {}: {source}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to write cache file {}: {source}", path.display()))]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("cache file {} is not a valid encoded plan: {source}", path.display()))]
    Decode {
        path: PathBuf,
        source: prost::DecodeError,
    },
}

/// One sub-plan's compiled form, as bytes. The byte payload stands in for
/// a serialized `ns_compiler::Trace`/IR; this crate does not depend on
/// `ns-compiler` to keep the cache format decoupled from the compiler's
/// in-memory representation, the way a cache format generally outlives any
/// one version of what it caches.
#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct SerializableSubPlan {
    #[prost(uint64, tag = "1")]
    pub sub_plan_id: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub compiled_ir: Vec<u8>,
}

#[derive(Clone, PartialEq, Eq, prost::Message)]
pub struct SerializableDecomposedQueryPlan {
    #[prost(uint64, tag = "1")]
    pub query_id: u64,
    #[prost(message, repeated, tag = "2")]
    pub sub_plans: Vec<SerializableSubPlan>,
}

/// `<testName>_<index>.pb`, per spec.md §6.
#[must_use]
pub fn cache_file_name(test_name: &str, index: usize) -> String {
    format!("{test_name}_{index}.pb")
}

pub fn write_cache(
    cache_dir: &Path,
    test_name: &str,
    index: usize,
    plan: &SerializableDecomposedQueryPlan,
) -> Result<PathBuf, CacheError> {
    let path = cache_dir.join(cache_file_name(test_name, index));
    std::fs::write(&path, plan.encode_to_vec()).context(WriteSnafu { path: path.clone() })?;
    Ok(path)
}

pub fn read_cache(
    cache_dir: &Path,
    test_name: &str,
    index: usize,
) -> Result<SerializableDecomposedQueryPlan, CacheError> {
    let path = cache_dir.join(cache_file_name(test_name, index));
    let bytes = std::fs::read(&path).context(ReadSnafu { path: path.clone() })?;
    SerializableDecomposedQueryPlan::decode(bytes.as_slice()).context(DecodeSnafu { path })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_file_name_matches_the_spec_naming_scheme() {
        assert_eq!(cache_file_name("tumbling_sum", 3), "tumbling_sum_3.pb");
    }

    #[test]
    fn a_plan_round_trips_through_the_cache_file() {
        let dir = std::env::temp_dir().join(format!("ns-engine-cache-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let plan = SerializableDecomposedQueryPlan {
            query_id: 42,
            sub_plans: vec![SerializableSubPlan {
                sub_plan_id: 1,
                compiled_ir: vec![1, 2, 3, 4],
            }],
        };
        write_cache(&dir, "tumbling_sum", 0, &plan).unwrap();
        let loaded = read_cache(&dir, "tumbling_sum", 0).unwrap();
        assert_eq!(loaded, plan);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn reading_a_missing_cache_file_is_an_error() {
        let dir = std::env::temp_dir();
        let result = read_cache(&dir, "definitely_not_a_real_test_name", 999);
        assert!(matches!(result, Err(CacheError::Read { .. })));
    }
}
