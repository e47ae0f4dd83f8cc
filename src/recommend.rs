//! Interest-based recommendations.
//!
//! Two users score 5 points for naming the same school and 1 point per
//! shared interest within each category. Items that do not match exactly
//! still score when their token vectors are nearly parallel.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::api::models::{Group, User};
use crate::api::Backend;
use crate::app::RoundUp;
use crate::error::Result;

pub const DEFAULT_MAX_RECOMMENDATIONS: usize = 10;
const SCHOOL_WEIGHT: f64 = 5.0;
const FUZZY_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, PartialEq)]
pub struct FriendRecommendation {
    pub user: User,
    pub score: f64,
    pub common_interests: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupRecommendation {
    pub group: Group,
    pub score: f64,
    pub member_count: usize,
}

/// Lower-cases, keeps alphanumeric tokens and drops a plural `s`.
pub fn normalize(item: &str) -> String {
    item.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(singular)
        .collect::<Vec<_>>()
        .join(" ")
}

fn singular(token: &str) -> &str {
    if token.len() > 3 && token.ends_with('s') && !token.ends_with("ss") {
        &token[..token.len() - 1]
    } else {
        token
    }
}

fn cosine(a: &str, b: &str) -> f64 {
    fn counts(s: &str) -> HashMap<&str, f64> {
        let mut m = HashMap::new();
        for t in s.split(' ').filter(|t| !t.is_empty()) {
            *m.entry(t).or_insert(0.0) += 1.0;
        }
        m
    }
    let (ca, cb) = (counts(a), counts(b));
    let dot: f64 = ca.iter().filter_map(|(t, x)| cb.get(t).map(|y| x * y)).sum();
    let norm = |m: &HashMap<&str, f64>| m.values().map(|v| v * v).sum::<f64>().sqrt();
    let denom = norm(&ca) * norm(&cb);
    if denom == 0.0 { 0.0 } else { dot / denom }
}

fn normalized_set(items: &[String]) -> BTreeSet<String> {
    items.iter().map(|i| normalize(i)).filter(|i| !i.is_empty()).collect()
}

fn same_school(a: &User, b: &User) -> bool {
    match (a.school.as_deref(), b.school.as_deref()) {
        (Some(x), Some(y)) => !x.trim().is_empty() && normalize(x) == normalize(y),
        _ => false,
    }
}

pub fn similarity(a: &User, b: &User) -> f64 {
    let mut score = if same_school(a, b) { SCHOOL_WEIGHT } else { 0.0 };

    for ((_, left), (_, right)) in a.interest_categories().iter().zip(b.interest_categories().iter()) {
        let left = normalized_set(left);
        let right = normalized_set(right);
        let exact: BTreeSet<&String> = left.intersection(&right).collect();
        score += exact.len() as f64;

        let rest_left: Vec<&String> = left.iter().filter(|i| !exact.contains(i)).collect();
        let rest_right: Vec<&String> = right.iter().filter(|i| !exact.contains(i)).collect();
        for x in &rest_left {
            for y in &rest_right {
                if cosine(x, y) > FUZZY_THRESHOLD {
                    score += 1.0;
                }
            }
        }
    }
    score
}

/// Exact overlaps per category, spelled as `a` spells them, plus the school.
pub fn common_interests(a: &User, b: &User) -> BTreeMap<String, Vec<String>> {
    let mut common = BTreeMap::new();
    for ((category, left), (_, right)) in a.interest_categories().iter().zip(b.interest_categories().iter()) {
        let right = normalized_set(right);
        let mut shared: Vec<String> = Vec::new();
        for item in left.iter() {
            if right.contains(&normalize(item)) && !shared.contains(item) {
                shared.push(item.clone());
            }
        }
        if !shared.is_empty() {
            common.insert(category.to_string(), shared);
        }
    }
    if same_school(a, b) {
        if let Some(school) = &a.school {
            common.insert("school".to_string(), vec![school.clone()]);
        }
    }
    common
}

fn by_score_desc(a: f64, b: f64) -> std::cmp::Ordering {
    b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
}

pub fn friend_recommendations(me: &User, users: &[User], max: usize) -> Vec<FriendRecommendation> {
    let mut scored: Vec<FriendRecommendation> = users
        .iter()
        .filter(|u| u.id != me.id)
        .map(|u| FriendRecommendation {
            user: u.clone(),
            score: similarity(me, u),
            common_interests: common_interests(me, u),
        })
        .collect();
    scored.sort_by(|a, b| by_score_desc(a.score, b.score));
    scored.truncate(max);
    scored
}

/// Groups `me` is not in, scored by average similarity to their members.
pub fn group_recommendations(me: &User, groups: &[Group], profiles: &[User], max: usize) -> Vec<GroupRecommendation> {
    let by_id: HashMap<&str, &User> = profiles.iter().map(|p| (p.id.as_str(), p)).collect();
    let mut scored: Vec<GroupRecommendation> = groups
        .iter()
        .filter(|g| !g.has_member(&me.id))
        .map(|g| {
            let members: Vec<&User> = g.members.iter().filter_map(|m| by_id.get(m.as_str()).copied()).collect();
            let score = if members.is_empty() {
                0.0
            } else {
                members.iter().map(|m| similarity(me, m)).sum::<f64>() / members.len() as f64
            };
            GroupRecommendation { group: g.clone(), score, member_count: g.member_count() }
        })
        .collect();
    scored.sort_by(|a, b| by_score_desc(a.score, b.score));
    scored.truncate(max);
    scored
}

impl<B: Backend> RoundUp<B> {
    pub async fn recommend_friends(&self, max: usize) -> Result<Vec<FriendRecommendation>> {
        let me = self.my_profile().await?;
        let users = self.backend().list_profiles().await?;
        Ok(friend_recommendations(&me, &users, max))
    }

    pub async fn recommend_groups(&self, max: usize) -> Result<Vec<GroupRecommendation>> {
        let me = self.my_profile().await?;
        let groups = self.backend().list_groups().await?;
        let profiles = self.backend().list_profiles().await?;
        Ok(group_recommendations(&me, &groups, &profiles, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(id: &str, school: Option<&str>, clubs: &[&str], games: &[&str]) -> User {
        let mut u = User::new(id, format!("{id}@example.com"));
        u.school = school.map(str::to_string);
        u.clubs = clubs.iter().map(|c| c.to_string()).collect();
        u.video_games = games.iter().map(|g| g.to_string()).collect();
        u
    }

    #[test]
    fn normalize_folds_case_punctuation_and_plurals() {
        assert_eq!(normalize("  Video-Games "), "video game");
        assert_eq!(normalize("Chess"), "chess");
        assert_eq!(normalize("!!"), "");
    }

    #[test]
    fn school_and_exact_matches_score() {
        let a = user("a", Some("Central High"), &["Math Club", "Chess"], &["Minecraft"]);
        let b = user("b", Some("central high"), &["math club"], &["Minecraft", "Fortnite"]);
        assert_eq!(similarity(&a, &b), 5.0 + 1.0 + 1.0);
    }

    #[test]
    fn missing_schools_do_not_match() {
        let a = user("a", None, &[], &[]);
        let b = user("b", None, &[], &[]);
        assert_eq!(similarity(&a, &b), 0.0);
        assert!(common_interests(&a, &b).is_empty());
    }

    #[test]
    fn near_matches_score_once() {
        let a = user("a", None, &["Robotics Club Team"], &[]);
        let b = user("b", None, &["robotics team club members"], &[]);
        // 3 shared of 3 and 4 tokens: cos = 3 / sqrt(12) ~ 0.866
        assert_eq!(similarity(&a, &b), 1.0);
    }

    #[test]
    fn common_interests_by_category() {
        let a = user("a", Some("Central"), &["Math Club"], &["Minecraft"]);
        let b = user("b", Some("Central"), &["math club"], &["Halo"]);
        let common = common_interests(&a, &b);
        assert_eq!(common["clubs"], vec!["Math Club".to_string()]);
        assert_eq!(common["school"], vec!["Central".to_string()]);
        assert!(!common.contains_key("video_games"));
    }

    #[test]
    fn friends_exclude_self_and_rank() {
        let me = user("me", Some("Central"), &["Chess"], &[]);
        let users = vec![
            me.clone(),
            user("far", None, &["Drama"], &[]),
            user("near", Some("Central"), &["Chess"], &[]),
            user("mid", None, &["Chess"], &[]),
        ];
        let recs = friend_recommendations(&me, &users, 2);
        let ids: Vec<&str> = recs.iter().map(|r| r.user.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert_eq!(recs[0].score, 6.0);
    }

    #[test]
    fn groups_skip_joined_and_average_members() {
        let me = user("me", None, &["Chess"], &[]);
        let p1 = user("p1", None, &["Chess"], &[]);
        let p2 = user("p2", None, &["Drama"], &[]);
        let g = |id: &str, members: &[&str]| Group {
            id: id.into(),
            name: id.into(),
            description: String::new(),
            creator_id: members[0].into(),
            members: members.iter().map(|m| m.to_string()).collect(),
            interests: vec![],
            created_at: Utc::now(),
        };
        let groups = vec![g("mine", &["me"]), g("mixed", &["p1", "p2"]), g("drama", &["p2"])];
        let recs = group_recommendations(&me, &groups, &[p1, p2], 10);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].group.id, "mixed");
        assert_eq!(recs[0].score, 0.5);
        assert_eq!(recs[0].member_count, 2);
        assert_eq!(recs[1].score, 0.0);
    }
}
