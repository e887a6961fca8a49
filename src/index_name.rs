/// Prefix of every derived trace index name.
pub const TRACE_INDEX_PREFIX: &str = "ss4o_traces";

/// Resolve the index trace documents are written to.
///
/// A non-empty `explicit_index` is returned unchanged. Otherwise the name is
/// `ss4o_traces-{dataset}-{namespace}`. Empty parts are skipped rather than
/// joined, so `("", "", "ns")` gives `ss4o_traces-ns` and never
/// `ss4o_traces--ns`, and the result is never empty. `Settings::validate`
/// rejects empty parts, so only direct callers reach that case.
#[must_use]
pub fn resolve_index_name(explicit_index: &str, dataset: &str, namespace: &str) -> String {
    if !explicit_index.is_empty() {
        return explicit_index.to_string();
    }

    [TRACE_INDEX_PREFIX, dataset, namespace]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derived_name() {
        assert_eq!(resolve_index_name("", "ds", "ns"), "ss4o_traces-ds-ns");
    }

    #[test]
    fn test_explicit_name_wins() {
        assert_eq!(resolve_index_name("custom", "ds", "ns"), "custom");
    }

    #[test]
    fn test_empty_dataset_and_namespace_fall_back_to_prefix() {
        assert_eq!(resolve_index_name("", "", ""), "ss4o_traces");
    }

    #[test]
    fn test_single_empty_part_is_skipped() {
        assert_eq!(resolve_index_name("", "", "ns"), "ss4o_traces-ns");
        assert_eq!(resolve_index_name("", "ds", ""), "ss4o_traces-ds");
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn explicit_index_is_returned_unchanged(
                explicit in "[a-z0-9_-]{1,24}",
                dataset in "[a-z]{0,8}",
                namespace in "[a-z]{0,8}",
            ) {
                prop_assert_eq!(resolve_index_name(&explicit, &dataset, &namespace), explicit);
            }

            #[test]
            fn derived_name_is_never_empty_and_prefixed(
                dataset in "[a-z]{0,8}",
                namespace in "[a-z]{0,8}",
            ) {
                let name = resolve_index_name("", &dataset, &namespace);
                prop_assert!(name.starts_with(TRACE_INDEX_PREFIX));
                prop_assert!(!name.ends_with('-'));
                prop_assert!(!name.contains("--"));
            }
        }
    }
}
