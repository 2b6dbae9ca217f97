use std::cmp::Ordering;

/// Numeric, component-wise comparison. Missing and non-numeric components
/// count as zero, so `1.0` equals `1.0.0`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = components(a);
    let right = components(b);
    let len = left.len().max(right.len());

    (0..len)
        .map(|index| {
            let l = left.get(index).copied().unwrap_or(0);
            let r = right.get(index).copied().unwrap_or(0);
            l.cmp(&r)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn components(version: &str) -> Vec<u64> {
    version
        .trim()
        .split('.')
        .map(|part| part.parse().unwrap_or(0))
        .collect()
}

/// Strip a release tag such as `v1.4.0` down to digits and dots.
pub fn extract_version(tag: &str) -> Option<String> {
    let kept: String = tag
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let trimmed = kept.trim_matches('.');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Find the first `vX.Y.Z` in a free-form app description.
pub fn version_from_app_info(info: &str) -> Option<String> {
    info.match_indices('v').find_map(|(index, _)| {
        let rest = &info[index + 1..];
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let candidate = rest[..end].trim_end_matches('.');
        let parts: Vec<&str> = candidate.split('.').collect();
        let well_formed = parts.len() >= 3 && parts.iter().all(|part| !part.is_empty());
        well_formed.then(|| parts[..3].join("."))
    })
}
