use crate::models::usermodel::{ClientPriority, ClientTier, FreelancerBadge};

pub fn badge_for(completed_jobs: i32) -> FreelancerBadge {
    match completed_jobs {
        i32::MIN..=9 => FreelancerBadge::Bronze,
        10..=24 => FreelancerBadge::Silver,
        25..=49 => FreelancerBadge::Gold,
        50..=99 => FreelancerBadge::Platinum,
        _ => FreelancerBadge::Elite,
    }
}

pub fn tier_for(completed_jobs: i32) -> ClientTier {
    match completed_jobs {
        i32::MIN..=9 => ClientTier::Basic,
        10..=24 => ClientTier::Silver,
        25..=49 => ClientTier::Gold,
        _ => ClientTier::Platinum,
    }
}

/// Sort weight for the placement list; higher goes first.
pub fn priority_weight(priority: ClientPriority) -> i32 {
    match priority {
        ClientPriority::Regular => 0,
        ClientPriority::Priority => 1,
        ClientPriority::Vip => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn badge_thresholds() {
        let cases = [
            (0, FreelancerBadge::Bronze),
            (9, FreelancerBadge::Bronze),
            (10, FreelancerBadge::Silver),
            (24, FreelancerBadge::Silver),
            (25, FreelancerBadge::Gold),
            (49, FreelancerBadge::Gold),
            (50, FreelancerBadge::Platinum),
            (99, FreelancerBadge::Platinum),
            (100, FreelancerBadge::Elite),
            (5000, FreelancerBadge::Elite),
        ];
        for (jobs, badge) in cases {
            assert_eq!(badge_for(jobs), badge, "{} jobs", jobs);
        }
    }

    #[test]
    fn tier_thresholds() {
        let cases = [
            (0, ClientTier::Basic),
            (9, ClientTier::Basic),
            (10, ClientTier::Silver),
            (25, ClientTier::Gold),
            (49, ClientTier::Gold),
            (50, ClientTier::Platinum),
            (400, ClientTier::Platinum),
        ];
        for (jobs, tier) in cases {
            assert_eq!(tier_for(jobs), tier, "{} jobs", jobs);
        }
    }

    #[test]
    fn badge_and_tier_never_drop_as_jobs_grow() {
        let mut badge = badge_for(0);
        let mut tier = tier_for(0);
        for jobs in 1..200 {
            assert!(badge_for(jobs) >= badge);
            assert!(tier_for(jobs) >= tier);
            badge = badge_for(jobs);
            tier = tier_for(jobs);
        }
    }

    #[test]
    fn vip_sorts_first() {
        assert!(priority_weight(ClientPriority::Vip) > priority_weight(ClientPriority::Priority));
        assert!(priority_weight(ClientPriority::Priority) > priority_weight(ClientPriority::Regular));
    }
}
