//! breakpoint.rs — breakpoint sets, logical breakpoint descriptors, logpoints.
//!
//! Grounded on `crates/vitte-debugger/src/breakpoint.rs`'s `BreakpointManager`
//! (file/function maps, `hit_count` countdown, `BreakAction` decision), widened
//! to the data model of spec.md §3: a breakpoint also carries a `hit_condition`
//! expression (evaluated over the hit counter, not just a fixed countdown) and
//! `BreakpointSet` is the line-membership view the dispatcher's hot path reads.

use indexmap::IndexSet;

pub type FileKey = String;
pub type BreakpointId = u64;

/// Ordered, set-semantics collection of line numbers for one source file.
///
/// Invariant: `set_breakpoints(f, S)` followed by `breakpoints(f)` returns
/// exactly `S` until the next mutating call or until the file's mtime
/// advances (enforced by [`crate::cache::breakpoints::BreakpointCache`], not
/// by this type).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BreakpointSet {
    lines: IndexSet<u32>,
}

impl BreakpointSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_lines(lines: impl IntoIterator<Item = u32>) -> Self {
        Self { lines: lines.into_iter().collect() }
    }

    pub fn insert(&mut self, line: u32) -> bool {
        self.lines.insert(line)
    }

    pub fn remove(&mut self, line: u32) -> bool {
        self.lines.shift_remove(&line)
    }

    pub fn contains(&self, line: u32) -> bool {
        self.lines.contains(&line)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.lines.iter().copied()
    }

    /// Does any line in this set fall within `[start, end]`? Used by the
    /// dispatcher's "function has breakpoints" gate step.
    pub fn intersects_range(&self, start: u32, end: u32) -> bool {
        self.lines.iter().any(|&l| l >= start && l <= end)
    }
}

impl FromIterator<u32> for BreakpointSet {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        Self::from_lines(iter)
    }
}

/// A logical breakpoint as described by the DAP layer's `setBreakpoints`
/// request: `(file, line, condition?, hit_condition?, log_message?, hit_count)`.
#[derive(Debug, Clone)]
pub struct BreakpointDescriptor {
    pub id: BreakpointId,
    pub file: FileKey,
    pub line: u32,
    /// Source expression evaluated in the stopped frame's environment.
    pub condition: Option<String>,
    /// Expression over the running hit counter (e.g. `"> 3"`, `"% 2 == 0"`).
    pub hit_condition: Option<String>,
    /// Non-empty ⇒ this is a logpoint: emit output, never stop.
    pub log_message: Option<String>,
    /// Number of times this line has been reached since the breakpoint was set.
    pub hit_count: u64,
    pub enabled: bool,
}

impl BreakpointDescriptor {
    pub fn is_logpoint(&self) -> bool {
        self.log_message.as_deref().is_some_and(|m| !m.is_empty())
    }
}

/// What to do once a frame has actually reached a breakpointed line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakAction {
    None,
    Stop(BreakpointId),
    Log(BreakpointId, String),
}

/// Per-file registry of resolved breakpoint descriptors. Owned by the
/// composition root ([`crate::runtime::Runtime`]); the dispatcher only ever
/// sees the derived [`BreakpointSet`] line membership via the cache.
#[derive(Default)]
pub struct BreakpointRegistry {
    next_id: BreakpointId,
    files: std::collections::HashMap<FileKey, Vec<BreakpointDescriptor>>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self { next_id: 1, files: std::collections::HashMap::new() }
    }

    /// Replaces the full set of breakpoints for `file`, DAP `setBreakpoints`
    /// style. Returns `{verified, line}` for each request, in request order.
    pub fn set_breakpoints(
        &mut self,
        file: impl Into<FileKey>,
        requests: &[BreakpointRequest],
    ) -> Vec<VerifiedBreakpoint> {
        let file = file.into();
        let mut resolved = Vec::with_capacity(requests.len());
        let mut verified = Vec::with_capacity(requests.len());
        for req in requests {
            let id = self.alloc_id();
            verified.push(VerifiedBreakpoint { verified: true, line: req.line });
            resolved.push(BreakpointDescriptor {
                id,
                file: file.clone(),
                line: req.line,
                condition: req.condition.clone(),
                hit_condition: req.hit_condition.clone(),
                log_message: req.log_message.clone(),
                hit_count: 0,
                enabled: true,
            });
        }
        self.files.insert(file, resolved);
        verified
    }

    /// Adds one descriptor without touching any of the file's existing
    /// breakpoints — unlike [`Self::set_breakpoints`], which replaces the
    /// whole file's list per the DAP `setBreakpoints` request semantics.
    /// Used for breakpoints resolved by function name, where the caller
    /// doesn't know (and must not disturb) the file's other line breakpoints.
    pub fn add_breakpoint(&mut self, file: impl Into<FileKey>, req: &BreakpointRequest) -> VerifiedBreakpoint {
        let file = file.into();
        let id = self.alloc_id();
        let descriptor = BreakpointDescriptor {
            id,
            file: file.clone(),
            line: req.line,
            condition: req.condition.clone(),
            hit_condition: req.hit_condition.clone(),
            log_message: req.log_message.clone(),
            hit_count: 0,
            enabled: true,
        };
        self.files.entry(file).or_default().push(descriptor);
        VerifiedBreakpoint { verified: true, line: req.line }
    }

    pub fn line_set(&self, file: &str) -> BreakpointSet {
        self.files
            .get(file)
            .map(|v| v.iter().filter(|b| b.enabled).map(|b| b.line).collect())
            .unwrap_or_default()
    }

    pub fn descriptors_for(&self, file: &str) -> &[BreakpointDescriptor] {
        self.files.get(file).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Decides the action for a frame that just reached `(file, line)`.
    /// `eval_cond` evaluates a boolean condition string against the current
    /// frame; it is the caller's job (the downstream/runtime layer, never the
    /// dispatcher hot path) to wire this to [`crate::condition::ConditionEvaluator`].
    pub fn should_break<F>(&mut self, file: &str, line: u32, mut eval_cond: F) -> BreakAction
    where
        F: FnMut(&str) -> bool,
    {
        let Some(list) = self.files.get_mut(file) else {
            return BreakAction::None;
        };
        for bp in list.iter_mut().filter(|b| b.enabled && b.line == line) {
            bp.hit_count += 1;
            if let Some(hit_cond) = &bp.hit_condition {
                if !eval_hit_condition(hit_cond, bp.hit_count) {
                    continue;
                }
            }
            if let Some(cond) = &bp.condition {
                if !eval_cond(cond) {
                    continue;
                }
            }
            if let Some(msg) = &bp.log_message {
                if !msg.is_empty() {
                    return BreakAction::Log(bp.id, msg.clone());
                }
            }
            return BreakAction::Stop(bp.id);
        }
        BreakAction::None
    }

    pub fn remove(&mut self, id: BreakpointId) -> bool {
        let mut removed = false;
        for list in self.files.values_mut() {
            let before = list.len();
            list.retain(|b| b.id != id);
            removed |= list.len() != before;
        }
        removed
    }

    pub fn clear(&mut self, file: Option<&str>) {
        match file {
            Some(f) => {
                self.files.remove(f);
            }
            None => self.files.clear(),
        }
    }

    fn alloc_id(&mut self) -> BreakpointId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Request shape from the DAP layer.
#[derive(Debug, Clone, Default)]
pub struct BreakpointRequest {
    pub line: u32,
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
    pub log_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifiedBreakpoint {
    pub verified: bool,
    pub line: u32,
}

/// Evaluates a tiny `hit_condition` grammar: an optional comparison operator
/// followed by an integer, e.g. `"> 3"`, `">= 10"`, `"== 5"`, or a bare
/// integer meaning `==`. Unparseable expressions are treated as always-true
/// (conservative: stop rather than silently skip), matching the condition
/// evaluator's own fallback policy.
fn eval_hit_condition(expr: &str, hit_count: u64) -> bool {
    let expr = expr.trim();
    let (op, rest) = if let Some(r) = expr.strip_prefix(">=") {
        (">=", r)
    } else if let Some(r) = expr.strip_prefix("<=") {
        ("<=", r)
    } else if let Some(r) = expr.strip_prefix('>') {
        (">", r)
    } else if let Some(r) = expr.strip_prefix('<') {
        ("<", r)
    } else if let Some(r) = expr.strip_prefix("==") {
        ("==", r)
    } else {
        ("==", expr)
    };
    match rest.trim().parse::<u64>() {
        Ok(n) => match op {
            ">=" => hit_count >= n,
            "<=" => hit_count <= n,
            ">" => hit_count > n,
            "<" => hit_count < n,
            _ => hit_count == n,
        },
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_set_round_trips() {
        let mut reg = BreakpointRegistry::new();
        reg.set_breakpoints(
            "/a/b.py",
            &[BreakpointRequest { line: 42, ..Default::default() }],
        );
        let set = reg.line_set("/a/b.py");
        assert!(set.contains(42));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn replacing_breakpoints_is_idempotent() {
        let mut reg = BreakpointRegistry::new();
        let reqs = [BreakpointRequest { line: 10, ..Default::default() }];
        reg.set_breakpoints("/a.py", &reqs);
        reg.set_breakpoints("/a.py", &reqs);
        assert_eq!(reg.line_set("/a.py").len(), 1);
    }

    #[test]
    fn add_then_remove_returns_to_original_state() {
        let mut reg = BreakpointRegistry::new();
        reg.set_breakpoints("/a.py", &[BreakpointRequest { line: 1, ..Default::default() }]);
        let before = reg.line_set("/a.py");

        reg.set_breakpoints(
            "/a.py",
            &[
                BreakpointRequest { line: 1, ..Default::default() },
                BreakpointRequest { line: 2, ..Default::default() },
            ],
        );
        let added_id = reg.descriptors_for("/a.py").iter().find(|b| b.line == 2).unwrap().id;
        assert!(reg.remove(added_id));

        // Re-set back to the original single breakpoint.
        reg.set_breakpoints("/a.py", &[BreakpointRequest { line: 1, ..Default::default() }]);
        assert_eq!(reg.line_set("/a.py"), before);
    }

    #[test]
    fn logpoint_never_stops() {
        let mut reg = BreakpointRegistry::new();
        reg.set_breakpoints(
            "/a.py",
            &[BreakpointRequest { line: 5, log_message: Some("hit {x}".into()), ..Default::default() }],
        );
        match reg.should_break("/a.py", 5, |_| true) {
            BreakAction::Log(_, msg) => assert_eq!(msg, "hit {x}"),
            other => panic!("expected Log, got {other:?}"),
        }
    }

    #[test]
    fn hit_condition_gates_before_condition() {
        let mut reg = BreakpointRegistry::new();
        reg.set_breakpoints(
            "/a.py",
            &[BreakpointRequest { line: 3, hit_condition: Some(">= 2".into()), ..Default::default() }],
        );
        assert_eq!(reg.should_break("/a.py", 3, |_| true), BreakAction::None);
        assert!(matches!(reg.should_break("/a.py", 3, |_| true), BreakAction::Stop(_)));
    }

    #[test]
    fn condition_false_suppresses_stop() {
        let mut reg = BreakpointRegistry::new();
        reg.set_breakpoints(
            "/a.py",
            &[BreakpointRequest { line: 10, condition: Some("x > 5".into()), ..Default::default() }],
        );
        assert_eq!(reg.should_break("/a.py", 10, |_| false), BreakAction::None);
        assert!(matches!(reg.should_break("/a.py", 10, |_| true), BreakAction::Stop(_)));
    }

    #[test]
    fn add_breakpoint_does_not_disturb_existing_lines() {
        let mut reg = BreakpointRegistry::new();
        reg.set_breakpoints("/a.py", &[BreakpointRequest { line: 1, ..Default::default() }]);
        let verified = reg.add_breakpoint("/a.py", &BreakpointRequest { line: 40, ..Default::default() });
        assert!(verified.verified);
        assert_eq!(verified.line, 40);
        let set = reg.line_set("/a.py");
        assert!(set.contains(1));
        assert!(set.contains(40));
    }

    #[test]
    fn intersects_range() {
        let set = BreakpointSet::from_lines([10, 20, 30]);
        assert!(set.intersects_range(15, 25));
        assert!(!set.intersects_range(21, 29));
    }
}
