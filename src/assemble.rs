//! Command reassembly: merging the resolved-path stream and the
//! passthrough stream back into the original token order, then swapping
//! the launcher for the target environment.

use crate::cluster::{CLUSTER_LAUNCHER, DIRECT_LAUNCHER};
use crate::resolve::ResolvedPath;

/// A token that passes through resolution unchanged (flags and plain
/// values), still tagged with its original position.
#[derive(Debug, Clone)]
pub struct OrderedToken {
    pub value: String,
    pub index: usize,
}

/// Merge the two streams by ascending original index.
///
/// Losing this ordering corrupts the command (a value could land before
/// its flag), so both streams are sorted before the two-pointer merge.
pub fn merge(resolved: Vec<ResolvedPath>, passthrough: Vec<OrderedToken>) -> Vec<String> {
    let mut paths: Vec<(usize, String)> = resolved
        .into_iter()
        .map(|entry| (entry.index, entry.resolved))
        .collect();
    let mut values: Vec<(usize, String)> = passthrough
        .into_iter()
        .map(|token| (token.index, token.value))
        .collect();
    paths.sort_by_key(|(index, _)| *index);
    values.sort_by_key(|(index, _)| *index);

    let mut command = Vec::with_capacity(paths.len() + values.len());
    let mut p = 0;
    let mut v = 0;
    while p < paths.len() && v < values.len() {
        if paths[p].0 < values[v].0 {
            command.push(paths[p].1.clone());
            p += 1;
        } else {
            command.push(values[v].1.clone());
            v += 1;
        }
    }
    command.extend(paths[p..].iter().map(|(_, value)| value.clone()));
    command.extend(values[v..].iter().map(|(_, value)| value.clone()));
    command
}

/// Rewrite the leading launcher token for the current environment. The
/// substitution is symmetric: a recorded cluster submission becomes a
/// direct run off-cluster and vice versa.
pub fn substitute_launcher(command: &mut [String], on_cluster: bool) {
    if let Some(first) = command.first_mut() {
        *first = if on_cluster {
            CLUSTER_LAUNCHER.to_string()
        } else {
            DIRECT_LAUNCHER.to_string()
        };
    }
}
