//! Priority-tier rotation
//!
//! Resources are grouped into tiers by priority. Lower tiers are always
//! preferred; inside a tier a cursor rotates round-robin so repeated requests
//! spread across equal-priority credentials.

use std::collections::BTreeMap;

/// Equal-priority members in registration order, plus the rotation cursor
#[derive(Debug, Default, Clone)]
pub struct Tier {
    members: Vec<usize>,
    cursor: usize,
}

impl Tier {
    /// Pool indices of this tier, in registration order
    pub fn members(&self) -> &[usize] {
        &self.members
    }

    /// Member positions in probe order, starting at the cursor
    pub fn probe_order(&self) -> impl Iterator<Item = usize> + '_ {
        let len = self.members.len();
        let start = if len == 0 { 0 } else { self.cursor % len };
        (0..len).map(move |offset| (start + offset) % len)
    }

    /// Move the cursor past the member at `position`
    pub fn advance_past(&mut self, position: usize) {
        if !self.members.is_empty() {
            self.cursor = (position + 1) % self.members.len();
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// All tiers, iterated from lowest (most preferred) priority upwards
#[derive(Debug, Default, Clone)]
pub struct PriorityRotation {
    tiers: BTreeMap<u32, Tier>,
}

impl PriorityRotation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pool index to its priority tier
    pub fn insert(&mut self, priority: u32, index: usize) {
        self.tiers.entry(priority).or_default().members.push(index);
    }

    pub fn tiers_mut(&mut self) -> impl Iterator<Item = (&u32, &mut Tier)> {
        self.tiers.iter_mut()
    }

    pub fn tier(&self, priority: u32) -> Option<&Tier> {
        self.tiers.get(&priority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiers_iterate_by_priority() {
        let mut rotation = PriorityRotation::new();
        rotation.insert(5, 0);
        rotation.insert(1, 1);
        rotation.insert(5, 2);

        let priorities: Vec<u32> = rotation.tiers_mut().map(|(p, _)| *p).collect();
        assert_eq!(priorities, vec![1, 5]);
        assert_eq!(rotation.tier(5).unwrap().members(), &[0, 2]);
    }

    #[test]
    fn test_probe_order_starts_at_cursor() {
        let mut rotation = PriorityRotation::new();
        for idx in 0..3 {
            rotation.insert(1, idx);
        }
        let (_, tier) = rotation.tiers_mut().next().unwrap();
        assert_eq!(tier.probe_order().collect::<Vec<_>>(), vec![0, 1, 2]);

        tier.advance_past(0);
        assert_eq!(tier.probe_order().collect::<Vec<_>>(), vec![1, 2, 0]);

        tier.advance_past(2);
        assert_eq!(tier.cursor(), 0);
    }
}
