use std::{cmp::Ordering, sync::{Arc, RwLock, Weak}};
use rand::Rng;
use super::obj::{compare_string_objects, create_string_object, equal_string_objects, Object, StringValue, MAX_SENTINEL, MIN_SENTINEL};

/// This skiplist implementation is almost a translation of the original
/// algorithm described by William Pugh in "Skip Lists: A Probabilistic
/// Alternative to Balanced Trees", modified in three ways:
/// a) this implementation allows for repeated scores.
/// b) the comparison is not just by key (our 'score') but by satellite data.
/// c) there is a back pointer, so it's a doubly linked list with the back
/// pointers being only at level 0. This allows to traverse the list
/// from tail to head, useful for finding the first node with a score.

const SKIPLIST_MAXLEVEL: usize = 32;

pub type NodeRef = Arc<RwLock<SkipListNode>>;

/// Compare two score objects.
/// A missing score (the header sentinel carries none) compares greater than
/// any present one. The range sentinels are recognized by pointer identity
/// and order strictly below/above every real value. Integer encoded pairs
/// take the numeric fast path, everything else compares on the decoded
/// strings.
pub fn sl_compare(s1: Option<&Arc<Object>>, s2: Option<&Arc<Object>>) -> Ordering {
    let (o1, o2) = match (s1, s2) {
        (None, None) => { return Ordering::Equal; },
        (None, Some(_)) => { return Ordering::Greater; },
        (Some(_), None) => { return Ordering::Less; },
        (Some(a), Some(b)) => (a, b),
    };
    if Arc::ptr_eq(o1, o2) {
        return Ordering::Equal;
    }
    if Arc::ptr_eq(o1, &*MIN_SENTINEL) || Arc::ptr_eq(o2, &*MAX_SENTINEL) {
        return Ordering::Less;
    }
    if Arc::ptr_eq(o1, &*MAX_SENTINEL) || Arc::ptr_eq(o2, &*MIN_SENTINEL) {
        return Ordering::Greater;
    }
    match (o1.as_ref(), o2.as_ref()) {
        (Object::String { ptr: p1 }, Object::String { ptr: p2 }) => {
            match (p1, p2) {
                (StringValue::Int(a), StringValue::Int(b)) => a.cmp(b),
                _ => compare_string_objects(o1.as_ref(), o2.as_ref()),
            }
        },
        _ => Ordering::Equal,
    }
}

/// A parsed range bound pair for SLRANGE.
pub struct RangeSpec {
    min: Arc<Object>,
    max: Arc<Object>,
    minex: bool,
    maxex: bool,
}

impl RangeSpec {
    /// Populate a range spec from the min and max bound objects.
    ///
    /// `(foo` means foo (open interval),
    /// `[foo` means foo (closed interval),
    /// `-` means the min string possible,
    /// `+` means the max string possible,
    /// anything else is taken as an inclusive bound as given.
    pub fn parse(min: &Arc<Object>, max: &Arc<Object>) -> Result<RangeSpec, String> {
        let (min, minex) = parse_range_item(min)?;
        let (max, maxex) = parse_range_item(max)?;
        Ok(RangeSpec { min, max, minex, maxex })
    }
}

fn parse_range_item(item: &Arc<Object>) -> Result<(Arc<Object>, bool), String> {
    // The bound can't be valid if the object is integer encoded,
    // the prefix character would have been lost.
    let s = match item.string() {
        Some(StringValue::Raw(s)) => s,
        _ => { return Err("integer encoded range bound".to_string()); },
    };
    match s.as_bytes().first() {
        Some(b'+') => {
            if s.len() != 1 { return Err(format!("malformed max bound '{}'", s)); }
            Ok((MAX_SENTINEL.clone(), false))
        },
        Some(b'-') => {
            if s.len() != 1 { return Err(format!("malformed min bound '{}'", s)); }
            Ok((MIN_SENTINEL.clone(), false))
        },
        Some(b'(') => Ok((create_string_object(&s[1..]), true)),
        Some(b'[') => Ok((create_string_object(&s[1..]), false)),
        _ => Ok((create_string_object(s), false)),
    }
}

pub struct SkipListNode {
    score: Option<Arc<Object>>,
    member: Option<Arc<Object>>,
    forward: Vec<Option<NodeRef>>,
    backward: Option<Weak<RwLock<SkipListNode>>>,
}

impl SkipListNode {
    fn new(level: usize, score: Option<Arc<Object>>, member: Option<Arc<Object>>) -> SkipListNode {
        SkipListNode {
            score,
            member,
            forward: vec![None; level],
            backward: None,
        }
    }

    pub fn score(&self) -> Option<Arc<Object>> {
        self.score.clone()
    }

    pub fn member(&self) -> Option<Arc<Object>> {
        self.member.clone()
    }

    pub fn forward(&self, level: usize) -> Option<NodeRef> {
        self.forward[level].clone()
    }

    pub fn backward(&self) -> Option<NodeRef> {
        match self.backward.clone() {
            Some(pre) => pre.upgrade(),
            None => None,
        }
    }
}

#[derive(Clone)]
pub struct SkipList {
    header: NodeRef,
    tail: Option<NodeRef>,
    length: usize,
    level: usize,
}

impl SkipList {
    pub fn new() -> SkipList {
        SkipList {
            header: Arc::new(RwLock::new(SkipListNode::new(SKIPLIST_MAXLEVEL, None, None))),
            tail: None,
            length: 0,
            level: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn level(&self) -> usize {
        self.level
    }

    pub fn tail(&self) -> Option<NodeRef> {
        self.tail.clone()
    }

    /// First node on the chain of the given level.
    pub fn front(&self, level: usize) -> Option<NodeRef> {
        self.header.read().unwrap().forward(level)
    }

    /// Returns a level in [1, SKIPLIST_MAXLEVEL] with a powerlaw-alike
    /// distribution where higher levels are less likely, stepping upward
    /// with probability 1/4.
    fn random_level() -> usize {
        let mut rand_gen = rand::thread_rng();
        let mut level = 1;
        while level < SKIPLIST_MAXLEVEL && rand_gen.gen_ratio(1, 4) {
            level += 1;
        }
        level
    }

    /// Walk forward on the given level as long as the next node sorts
    /// strictly before (score, member); score-only walk when member is None.
    fn advance(x: &mut NodeRef, i: usize, score: &Arc<Object>, member: Option<&Arc<Object>>) {
        loop {
            let next = x.read().unwrap().forward(i);
            let step = match next.as_ref() {
                Some(n) => {
                    let n_r = n.read().unwrap();
                    match sl_compare(n_r.score.as_ref(), Some(score)) {
                        Ordering::Less => true,
                        Ordering::Equal => {
                            match member {
                                Some(m) => sl_compare(n_r.member.as_ref(), Some(m)) == Ordering::Less,
                                None => false,
                            }
                        },
                        Ordering::Greater => false,
                    }
                },
                None => false,
            };
            if !step {
                break;
            }
            *x = next.unwrap();
        }
    }

    /// Insert a new node. Takes ownership of the two references; the caller
    /// clones beforehand when it retains its own handle. Duplicated
    /// (score, member) pairs are allowed by this primitive, the command
    /// layer deletes the equal pair first.
    pub fn insert(&mut self, score: Arc<Object>, member: Arc<Object>) -> NodeRef {
        let mut update: Vec<Option<NodeRef>> = vec![None; SKIPLIST_MAXLEVEL];

        let mut x = self.header.clone();
        for i in (0..self.level).rev() {
            Self::advance(&mut x, i, &score, Some(&member));
            update[i] = Some(x.clone());
        }

        let level = Self::random_level();
        if level > self.level {
            for i in self.level..level {
                update[i] = Some(self.header.clone());
            }
            self.level = level;
        }

        let x = Arc::new(RwLock::new(SkipListNode::new(level, Some(score), Some(member))));
        for i in 0..level {
            let prev = update[i].as_ref().unwrap();
            let next = prev.read().unwrap().forward(i);
            x.write().unwrap().forward[i] = next;
            prev.write().unwrap().forward[i] = Some(x.clone());
        }

        x.write().unwrap().backward = match Arc::ptr_eq(update[0].as_ref().unwrap(), &self.header) {
            true => None,
            false => Some(Arc::downgrade(update[0].as_ref().unwrap())),
        };
        let next0 = x.read().unwrap().forward(0);
        match next0 {
            Some(next) => { next.write().unwrap().backward = Some(Arc::downgrade(&x)); },
            None => { self.tail = Some(x.clone()); },
        }
        self.length += 1;

        x
    }

    /// Delete the node with matching score and member. Returns whether a
    /// node was removed.
    pub fn delete(&mut self, score: &Arc<Object>, member: &Arc<Object>) -> bool {
        let mut update: Vec<Option<NodeRef>> = vec![None; SKIPLIST_MAXLEVEL];

        let mut x = self.header.clone();
        for i in (0..self.level).rev() {
            Self::advance(&mut x, i, score, Some(member));
            update[i] = Some(x.clone());
        }

        // We may have multiple nodes with the same score, what we need
        // is the node with both the right score and member.
        let candidate = x.read().unwrap().forward(0);
        if let Some(node) = candidate {
            let found = {
                let n_r = node.read().unwrap();
                sl_compare(Some(score), n_r.score.as_ref()) == Ordering::Equal
                    && equal_string_objects(n_r.member.as_ref().unwrap().as_ref(), member.as_ref())
            };
            if found {
                self.delete_node(&node, &update);
                return true;
            }
        }
        false
    }

    /// Delete every node of the given score's equivalence class. Returns the
    /// deletion count.
    pub fn delete_score(&mut self, score: &Arc<Object>) -> usize {
        let mut update: Vec<Option<NodeRef>> = vec![None; SKIPLIST_MAXLEVEL];

        let mut x = self.header.clone();
        for i in (0..self.level).rev() {
            Self::advance(&mut x, i, score, None);
            update[i] = Some(x.clone());
        }

        let mut deleted = 0;
        let mut cursor = x.read().unwrap().forward(0);
        while let Some(node) = cursor {
            if sl_compare(Some(score), node.read().unwrap().score.as_ref()) != Ordering::Equal {
                break;
            }
            let next = node.read().unwrap().forward(0);
            self.delete_node(&node, &update);
            deleted += 1;
            cursor = next;
        }
        deleted
    }

    /// Internal unlink used by delete and delete_score. The update vector
    /// holds the per-level predecessors captured by the preceding descent.
    fn delete_node(&mut self, x: &NodeRef, update: &[Option<NodeRef>]) {
        for i in 0..self.level {
            let prev = update[i].as_ref().unwrap();
            let next_is_x = match prev.read().unwrap().forward(i) {
                Some(ref n) => Arc::ptr_eq(n, x),
                None => false,
            };
            if next_is_x {
                let succ = x.read().unwrap().forward(i);
                prev.write().unwrap().forward[i] = succ;
            }
        }

        let backward = x.read().unwrap().backward.clone();
        let next0 = x.read().unwrap().forward(0);
        match next0 {
            Some(next) => { next.write().unwrap().backward = backward; },
            None => {
                self.tail = match backward {
                    Some(pre) => pre.upgrade(),
                    None => None,
                };
            },
        }

        while self.level > 1 && self.header.read().unwrap().forward(self.level - 1).is_none() {
            self.level -= 1;
        }
        self.length -= 1;
    }

    /// Returns the first node of the given score's equivalence class.
    /// All the following nodes from here are in order and can be iterated.
    pub fn search_smallest_node(&self, score: &Arc<Object>) -> Option<NodeRef> {
        let mut x = self.header.clone();
        for i in (0..self.level).rev() {
            loop {
                let next = match x.read().unwrap().forward(i) {
                    Some(n) => n,
                    None => break,
                };
                let cmp = sl_compare(next.read().unwrap().score.as_ref(), Some(score));
                match cmp {
                    Ordering::Less => { x = next; },
                    Ordering::Equal => {
                        let mut x = next;
                        // backtrack on the level 0 chain to the first node
                        // of the score's equivalence class
                        loop {
                            let back = x.read().unwrap().backward();
                            match back {
                                Some(b) if sl_compare(b.read().unwrap().score.as_ref(), Some(score)) == Ordering::Equal => { x = b; },
                                _ => break,
                            }
                        }
                        return Some(x);
                    },
                    Ordering::Greater => break,
                }
            }
        }
        None
    }

    /// Locate the low end candidate for a range query: the first node equal
    /// to the range minimum, or the first node strictly greater when no
    /// equal node exists. The flag reports which case was hit. Returns None
    /// when the whole list sorts above the range maximum or below the range
    /// minimum.
    fn range_smallest_node(&self, range: &RangeSpec) -> Option<(NodeRef, bool)> {
        let first = self.front(0)?;
        if sl_compare(first.read().unwrap().score.as_ref(), Some(&range.max)) == Ordering::Greater {
            return None;
        }

        let mut x = self.header.clone();
        for i in (0..self.level).rev() {
            loop {
                let next = match x.read().unwrap().forward(i) {
                    Some(n) => n,
                    None => break,
                };
                let cmp = sl_compare(next.read().unwrap().score.as_ref(), Some(&range.min));
                match cmp {
                    Ordering::Less => { x = next; },
                    Ordering::Equal => {
                        let mut x = next;
                        // with an inclusive minimum every duplicate of the
                        // bound qualifies, so backtrack to the first one
                        while !range.minex {
                            let back = x.read().unwrap().backward();
                            match back {
                                Some(b) if sl_compare(b.read().unwrap().score.as_ref(), Some(&range.min)) == Ordering::Equal => { x = b; },
                                _ => break,
                            }
                        }
                        return Some((x, true));
                    },
                    Ordering::Greater => {
                        if i == 0 {
                            return Some((next, false));
                        }
                        break;
                    },
                }
            }
        }
        None
    }

    /// The smallest relevant node for a range query, accommodating an
    /// excluded minimum. None when the minimum is outside the range.
    pub fn range_low_end(&self, range: &RangeSpec) -> Option<NodeRef> {
        let (mut smallest, found_exact) = self.range_smallest_node(range)?;
        if range.minex && found_exact {
            // loop forward past the whole equivalence class of the minimum
            while sl_compare(smallest.read().unwrap().score.as_ref(), Some(&range.min)) == Ordering::Equal {
                let next = smallest.read().unwrap().forward(0);
                match next {
                    Some(n) => { smallest = n; },
                    None => { return None; },
                }
            }
        }
        Some(smallest)
    }

    /// Locate the high end candidate for a range query: the last node equal
    /// to the range maximum, or the first node strictly greater when no
    /// equal node exists.
    fn range_largest_node(&self, range: &RangeSpec) -> Option<(NodeRef, bool)> {
        let tail = self.tail.clone()?;
        if sl_compare(tail.read().unwrap().score.as_ref(), Some(&range.max)) == Ordering::Less {
            // the entire list qualifies on the high side
            return Some((tail, false));
        }

        let mut x = self.header.clone();
        for i in (0..self.level).rev() {
            loop {
                let next = match x.read().unwrap().forward(i) {
                    Some(n) => n,
                    None => break,
                };
                let cmp = sl_compare(next.read().unwrap().score.as_ref(), Some(&range.max));
                match cmp {
                    Ordering::Less => { x = next; },
                    Ordering::Equal => {
                        if range.maxex {
                            // an exact hit that must be excluded anyway,
                            // short-circuit out and let the caller back up
                            return Some((next, true));
                        }
                        let two_forward_equal = {
                            match next.read().unwrap().forward(i) {
                                Some(nn) => sl_compare(nn.read().unwrap().score.as_ref(), Some(&range.max)) == Ordering::Equal,
                                None => false,
                            }
                        };
                        if two_forward_equal {
                            // fast forward on this level over comparable scores
                            x = next;
                        } else if i == 0 {
                            return Some((next, true));
                        } else {
                            // can't advance on this level, continue one down
                            break;
                        }
                    },
                    Ordering::Greater => {
                        if i == 0 {
                            return Some((next, false));
                        }
                        break;
                    },
                }
            }
        }
        None
    }

    /// The largest relevant node for a range query, accommodating an
    /// excluded maximum. None when the maximum is outside the range.
    pub fn range_high_end(&self, range: &RangeSpec) -> Option<NodeRef> {
        let (mut largest, found_exact) = self.range_largest_node(range)?;
        if range.maxex && found_exact {
            // back out of the whole equivalence class of the maximum
            while sl_compare(largest.read().unwrap().score.as_ref(), Some(&range.max)) == Ordering::Equal {
                let back = largest.read().unwrap().backward();
                match back {
                    Some(b) => { largest = b; },
                    None => { return None; },
                }
            }
        }
        Some(largest)
    }
}

impl Drop for SkipList {
    fn drop(&mut self) {
        // Sever the forward chains iteratively so dropping a long list does
        // not recurse once per node. Clones share the node graph, only the
        // last handle tears it down.
        if Arc::strong_count(&self.header) != 1 {
            return;
        }
        self.tail = None;
        let mut cursor = {
            let mut h = self.header.write().unwrap();
            let next = h.forward[0].take();
            for f in h.forward.iter_mut() { *f = None; }
            next
        };
        while let Some(node) = cursor {
            let mut n_w = node.write().unwrap();
            let next = n_w.forward[0].take();
            for f in n_w.forward.iter_mut() { *f = None; }
            drop(n_w);
            cursor = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn obj(s: &str) -> Arc<Object> {
        create_string_object(s)
    }

    fn fill(pairs: &[(&str, &str)]) -> SkipList {
        let mut sl = SkipList::new();
        for (s, m) in pairs {
            sl.insert(obj(s), obj(m));
        }
        sl
    }

    fn level0(sl: &SkipList) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut cursor = sl.front(0);
        while let Some(node) = cursor {
            let n_r = node.read().unwrap();
            out.push((
                n_r.score().unwrap().get_decoded().as_key().to_string(),
                n_r.member().unwrap().get_decoded().as_key().to_string(),
            ));
            cursor = n_r.forward(0);
        }
        out
    }

    fn range(min: &str, max: &str) -> RangeSpec {
        RangeSpec::parse(&obj(min), &obj(max)).unwrap()
    }

    fn node_key(node: &NodeRef) -> (String, String) {
        let n_r = node.read().unwrap();
        (
            n_r.score().unwrap().get_decoded().as_key().to_string(),
            n_r.member().unwrap().get_decoded().as_key().to_string(),
        )
    }

    fn check_invariants(sl: &SkipList) {
        // level 0 ordering and length
        let mut nodes: Vec<NodeRef> = Vec::new();
        let mut cursor = sl.front(0);
        while let Some(node) = cursor {
            nodes.push(node.clone());
            cursor = node.read().unwrap().forward(0);
        }
        assert_eq!(nodes.len(), sl.len());
        for w in nodes.windows(2) {
            let a = w[0].read().unwrap();
            let b = w[1].read().unwrap();
            let cmp = sl_compare(a.score.as_ref(), b.score.as_ref());
            assert_ne!(cmp, Ordering::Greater);
            if cmp == Ordering::Equal {
                assert_ne!(sl_compare(a.member.as_ref(), b.member.as_ref()), Ordering::Greater);
            }
        }

        // tail is the last level 0 node
        match nodes.last() {
            Some(last) => assert!(Arc::ptr_eq(last, &sl.tail().unwrap())),
            None => assert!(sl.tail().is_none()),
        }

        // backward is the inverse of forward at level 0
        for (idx, node) in nodes.iter().enumerate() {
            let back = node.read().unwrap().backward();
            match idx {
                0 => assert!(back.is_none()),
                _ => assert!(Arc::ptr_eq(&back.unwrap(), &nodes[idx - 1])),
            }
        }

        // every higher level chain is a subsequence of level 0
        for i in 1..sl.level() {
            let mut pos = 0;
            let mut cursor = sl.front(i);
            while let Some(node) = cursor {
                while pos < nodes.len() && !Arc::ptr_eq(&nodes[pos], &node) {
                    pos += 1;
                }
                assert!(pos < nodes.len(), "level {} chain escapes level 0", i);
                cursor = node.read().unwrap().forward(i);
            }
        }

        // the top occupied level matches the recorded one
        assert!(sl.level() >= 1);
        assert!(sl.level() == 1 || sl.front(sl.level() - 1).is_some());
    }

    #[test]
    fn insert_orders_by_score_then_member() {
        let sl = fill(&[("2", "c"), ("1", "b"), ("1", "a"), ("3", "d")]);
        assert_eq!(sl.len(), 4);
        assert_eq!(level0(&sl), vec![
            ("1".to_string(), "a".to_string()),
            ("1".to_string(), "b".to_string()),
            ("2".to_string(), "c".to_string()),
            ("3".to_string(), "d".to_string()),
        ]);
        check_invariants(&sl);
    }

    #[test]
    fn delete_exact_pair() {
        let mut sl = fill(&[("1", "a"), ("1", "b"), ("2", "c")]);
        assert!(!sl.delete(&obj("1"), &obj("c")));
        assert!(sl.delete(&obj("1"), &obj("a")));
        assert!(!sl.delete(&obj("1"), &obj("a")));
        assert_eq!(level0(&sl), vec![
            ("1".to_string(), "b".to_string()),
            ("2".to_string(), "c".to_string()),
        ]);
        check_invariants(&sl);
    }

    #[test]
    fn delete_tail_fixes_tail_pointer() {
        let mut sl = fill(&[("1", "a"), ("2", "b")]);
        assert!(sl.delete(&obj("2"), &obj("b")));
        assert_eq!(node_key(&sl.tail().unwrap()), ("1".to_string(), "a".to_string()));
        assert!(sl.delete(&obj("1"), &obj("a")));
        assert!(sl.tail().is_none());
        assert_eq!(sl.len(), 0);
        check_invariants(&sl);
    }

    #[test]
    fn delete_score_removes_whole_class() {
        let mut sl = fill(&[("1", "a"), ("1", "b"), ("1", "c"), ("2", "d")]);
        assert_eq!(sl.delete_score(&obj("1")), 3);
        assert_eq!(sl.delete_score(&obj("9")), 0);
        assert_eq!(level0(&sl), vec![("2".to_string(), "d".to_string())]);
        check_invariants(&sl);
    }

    #[test]
    fn search_smallest_returns_first_of_class() {
        let sl = fill(&[("1", "a"), ("2", "m"), ("2", "n"), ("2", "z"), ("3", "x")]);
        let node = sl.search_smallest_node(&obj("2")).unwrap();
        assert_eq!(node_key(&node), ("2".to_string(), "m".to_string()));
        assert!(sl.search_smallest_node(&obj("9")).is_none());
        assert!(sl.search_smallest_node(&obj("0")).is_none());
    }

    #[test]
    fn range_inclusive_bounds() {
        let sl = fill(&[("1", "a"), ("1", "b"), ("2", "c"), ("3", "d")]);
        let r = range("[1", "[2");
        assert_eq!(node_key(&sl.range_low_end(&r).unwrap()), ("1".to_string(), "a".to_string()));
        assert_eq!(node_key(&sl.range_high_end(&r).unwrap()), ("2".to_string(), "c".to_string()));
    }

    #[test]
    fn range_exclusive_bounds() {
        let sl = fill(&[("1", "a"), ("1", "b"), ("2", "c"), ("2", "x"), ("3", "d")]);
        let r = range("(1", "(3");
        assert_eq!(node_key(&sl.range_low_end(&r).unwrap()), ("2".to_string(), "c".to_string()));
        assert_eq!(node_key(&sl.range_high_end(&r).unwrap()), ("2".to_string(), "x".to_string()));
    }

    #[test]
    fn range_exclusive_min_skips_whole_class() {
        let sl = fill(&[("1", "a"), ("1", "b"), ("1", "c")]);
        let r = range("(1", "+");
        assert!(sl.range_low_end(&r).is_none());
    }

    #[test]
    fn range_exclusive_max_backs_out_of_class() {
        let sl = fill(&[("1", "a"), ("1", "b")]);
        let r = range("-", "(1");
        assert!(sl.range_high_end(&r).is_none());
    }

    #[test]
    fn range_sentinels_cover_everything() {
        let sl = fill(&[("1", "a"), ("2", "b"), ("3", "c")]);
        let r = range("-", "+");
        assert_eq!(node_key(&sl.range_low_end(&r).unwrap()), ("1".to_string(), "a".to_string()));
        assert_eq!(node_key(&sl.range_high_end(&r).unwrap()), ("3".to_string(), "c".to_string()));
    }

    #[test]
    fn range_above_all_scores_is_empty() {
        let sl = fill(&[("5", "a"), ("6", "b")]);
        assert!(sl.range_low_end(&range("[1", "[2")).is_none());
    }

    #[test]
    fn range_below_all_scores_is_empty() {
        let sl = fill(&[("1", "a"), ("2", "b")]);
        assert!(sl.range_low_end(&range("[8", "[9")).is_none());
    }

    #[test]
    fn range_missing_inclusive_min_starts_at_next_node() {
        let sl = fill(&[("1", "a"), ("3", "b"), ("5", "c")]);
        let r = range("[2", "[5");
        assert_eq!(node_key(&sl.range_low_end(&r).unwrap()), ("3".to_string(), "b".to_string()));
    }

    #[test]
    fn range_duplicate_max_keeps_last_of_class() {
        let sl = fill(&[("1", "a"), ("2", "m"), ("2", "n"), ("2", "z"), ("3", "d")]);
        let r = range("[1", "[2");
        assert_eq!(node_key(&sl.range_high_end(&r).unwrap()), ("2".to_string(), "z".to_string()));
    }

    #[test]
    fn parse_range_grammar() {
        assert!(RangeSpec::parse(&obj("+"), &obj("-")).is_ok());
        assert!(RangeSpec::parse(&obj("(a"), &obj("[b")).is_ok());
        assert!(RangeSpec::parse(&obj("a"), &obj("b")).is_ok());
        assert!(RangeSpec::parse(&obj("+x"), &obj("b")).is_err());
        assert!(RangeSpec::parse(&obj("a"), &obj("-x")).is_err());

        let enc = crate::obj::try_object_encoding(obj("12"));
        assert!(RangeSpec::parse(&enc, &obj("b")).is_err());
        assert!(RangeSpec::parse(&obj("a"), &enc).is_err());

        let r = range("(aa", "[bb");
        assert!(r.minex && !r.maxex);
        assert_eq!(r.min.as_key(), "aa");
        assert_eq!(r.max.as_key(), "bb");
    }

    #[test]
    fn compare_sentinels_and_encodings() {
        let a = obj("a");
        assert_eq!(sl_compare(Some(&*MIN_SENTINEL), Some(&a)), Ordering::Less);
        assert_eq!(sl_compare(Some(&a), Some(&*MIN_SENTINEL)), Ordering::Greater);
        assert_eq!(sl_compare(Some(&*MAX_SENTINEL), Some(&a)), Ordering::Greater);
        assert_eq!(sl_compare(Some(&a), Some(&*MAX_SENTINEL)), Ordering::Less);
        assert_eq!(sl_compare(None, Some(&a)), Ordering::Greater);
        assert_eq!(sl_compare(Some(&a), None), Ordering::Less);
        assert_eq!(sl_compare(None, None), Ordering::Equal);

        // integer fast path orders numerically, not lexicographically
        let two = crate::obj::try_object_encoding(obj("2"));
        let ten = crate::obj::try_object_encoding(obj("10"));
        assert_eq!(sl_compare(Some(&two), Some(&ten)), Ordering::Less);
    }

    proptest! {
        #[test]
        fn random_ops_preserve_invariants(ops in proptest::collection::vec((0u8..3, 0usize..6, 0usize..4), 1..80)) {
            static SCORES: [&str; 6] = ["a", "b", "c", "d", "e", "f"];
            static MEMBERS: [&str; 4] = ["m", "n", "o", "p"];
            let mut sl = SkipList::new();
            let mut model: Vec<(String, String)> = Vec::new();
            for (op, si, mi) in ops {
                let score = SCORES[si];
                let member = MEMBERS[mi];
                match op {
                    0 => {
                        // mimic the command layer: at most one equal pair
                        if sl.delete(&obj(score), &obj(member)) {
                            model.retain(|(s, m)| !(s == score && m == member));
                        }
                        sl.insert(obj(score), obj(member));
                        model.push((score.to_string(), member.to_string()));
                    },
                    1 => {
                        let removed = sl.delete(&obj(score), &obj(member));
                        let before = model.len();
                        model.retain(|(s, m)| !(s == score && m == member));
                        prop_assert_eq!(removed, model.len() != before);
                    },
                    _ => {
                        let removed = sl.delete_score(&obj(score));
                        let before = model.len();
                        model.retain(|(s, _)| s != score);
                        prop_assert_eq!(removed, before - model.len());
                    },
                }
                check_invariants(&sl);
            }
            model.sort();
            prop_assert_eq!(level0(&sl), model);
        }
    }
}
