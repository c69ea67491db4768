//! Unified line diff between consecutive contract versions

/// Lines of unchanged context around each hunk
pub const DEFAULT_CONTEXT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Equal,
    Delete,
    Insert,
}

#[derive(Debug, Clone, Copy)]
struct Step<'a> {
    op: Op,
    text: &'a str,
    /// Old-side line index before this step
    old: usize,
    /// New-side line index before this step
    new: usize,
}

/// Largest LCS table (cells) built for the changed middle of two versions
pub const MAX_LCS_CELLS: usize = 4_000_000;

/// Line-level edit script via longest common subsequence
///
/// Common prefix and suffix are peeled off first so the quadratic table only
/// covers the changed middle. A middle larger than [`MAX_LCS_CELLS`] is
/// reported as one block replacement instead of a minimal script.
fn edit_script<'a>(old: &[&'a str], new: &[&'a str]) -> Vec<(Op, &'a str)> {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &old[prefix..old.len() - suffix];
    let b = &new[prefix..new.len() - suffix];
    let (n, m) = (a.len(), b.len());

    let mut script: Vec<(Op, &str)> = old[..prefix].iter().map(|l| (Op::Equal, *l)).collect();
    if (n + 1).saturating_mul(m + 1) > MAX_LCS_CELLS {
        tracing::debug!(old_lines = n, new_lines = m, "Diff middle too large, replacing as a block");
        script.extend(a.iter().map(|l| (Op::Delete, *l)));
        script.extend(b.iter().map(|l| (Op::Insert, *l)));
        script.extend(old[old.len() - suffix..].iter().map(|l| (Op::Equal, *l)));
        return script;
    }

    // lcs[i][j] = LCS length of a[i..] and b[j..]
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && j < m && a[i] == b[j] {
            script.push((Op::Equal, a[i]));
            i += 1;
            j += 1;
        } else if j == m || (i < n && lcs[i + 1][j] >= lcs[i][j + 1]) {
            script.push((Op::Delete, a[i]));
            i += 1;
        } else {
            script.push((Op::Insert, b[j]));
            j += 1;
        }
    }
    script.extend(old[old.len() - suffix..].iter().map(|l| (Op::Equal, *l)));
    script
}

/// `start,len` range as printed in a hunk header (1-based)
fn hunk_range(start: usize, len: usize) -> String {
    match len {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{len}", start + 1),
    }
}

/// Unified diff of `old` against `new`, truncated to `max_lines` lines
///
/// Identical inputs yield an empty string. Output starts with `---`/`+++`
/// headers followed by `@@` hunks carrying `context` lines of context.
#[must_use]
pub fn unified_diff(old: &str, new: &str, context: usize, max_lines: usize) -> String {
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let mut steps = Vec::new();
    let (mut o, mut n) = (0, 0);
    for (op, text) in edit_script(&old_lines, &new_lines) {
        steps.push(Step {
            op,
            text,
            old: o,
            new: n,
        });
        match op {
            Op::Equal => {
                o += 1;
                n += 1;
            }
            Op::Delete => o += 1,
            Op::Insert => n += 1,
        }
    }

    let changes: Vec<usize> = steps
        .iter()
        .enumerate()
        .filter(|(_, s)| s.op != Op::Equal)
        .map(|(idx, _)| idx)
        .collect();
    let Some(&first) = changes.first() else {
        return String::new();
    };

    // Merge changes whose context windows touch
    let mut hunks: Vec<(usize, usize)> = Vec::new();
    let mut lo = first.saturating_sub(context);
    let mut last = first;
    for &idx in &changes[1..] {
        if idx - last > 2 * context {
            hunks.push((lo, (last + context + 1).min(steps.len())));
            lo = idx - context;
        }
        last = idx;
    }
    hunks.push((lo, (last + context + 1).min(steps.len())));

    let mut out = vec!["--- previous".to_string(), "+++ current".to_string()];
    for (lo, hi) in hunks {
        let window = &steps[lo..hi];
        let old_len = window.iter().filter(|s| s.op != Op::Insert).count();
        let new_len = window.iter().filter(|s| s.op != Op::Delete).count();
        out.push(format!(
            "@@ -{} +{} @@",
            hunk_range(window[0].old, old_len),
            hunk_range(window[0].new, new_len)
        ));
        for step in window {
            let marker = match step.op {
                Op::Equal => ' ',
                Op::Delete => '-',
                Op::Insert => '+',
            };
            out.push(format!("{marker}{}", step.text));
        }
    }

    out.truncate(max_lines);
    out.join("\n")
}
