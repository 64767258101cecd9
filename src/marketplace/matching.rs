//! Stateless job/candidate filters used by dashboards and the notification fan-out.

use std::collections::BTreeSet;

use super::domain::{Job, JobFilter, User};

/// Trim and lower-case a skill; blank entries are dropped.
pub fn normalize_skill(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

pub fn normalize_skills<I, T>(raw: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = T>,
    T: AsRef<str>,
{
    raw.into_iter()
        .filter_map(|skill| normalize_skill(skill.as_ref()))
        .collect()
}

/// Case-insensitive non-empty intersection test.
pub fn skills_overlap(left: &BTreeSet<String>, right: &BTreeSet<String>) -> bool {
    let left = normalize_skills(left);
    right
        .iter()
        .filter_map(|skill| normalize_skill(skill))
        .any(|skill| left.contains(&skill))
}

/// Jobs whose required skills intersect `seeker_skills`, in input order.
pub fn match_jobs(seeker_skills: &BTreeSet<String>, candidates: Vec<Job>) -> Vec<Job> {
    candidates
        .into_iter()
        .filter(|job| skills_overlap(seeker_skills, &job.required_skills))
        .collect()
}

/// Seekers with at least one skill the job asks for, in input order.
pub fn matching_seekers<'a>(required_skills: &BTreeSet<String>, seekers: &'a [User]) -> Vec<&'a User> {
    seekers
        .iter()
        .filter(|user| skills_overlap(required_skills, &user.skills))
        .collect()
}

/// Exact, case-sensitive equality on whichever of status/location/category are set.
pub fn filter_jobs(jobs: Vec<Job>, filter: &JobFilter) -> Vec<Job> {
    jobs.into_iter()
        .filter(|job| filter.status.map_or(true, |status| job.status == status))
        .filter(|job| {
            filter
                .location
                .as_deref()
                .map_or(true, |location| job.location == location)
        })
        .filter(|job| {
            filter
                .category
                .as_deref()
                .map_or(true, |category| job.category == category)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marketplace::domain::{JobId, JobStatus, Role, UserId};
    use chrono::Utc;

    fn job(id: &str, location: &str, category: &str, skills: &[&str]) -> Job {
        Job {
            id: JobId::new(id),
            provider_id: UserId::new("p-1"),
            provider_name: "Farmer John".to_string(),
            title: id.to_string(),
            description: String::new(),
            location: location.to_string(),
            category: category.to_string(),
            required_skills: skills.iter().map(|skill| skill.to_string()).collect(),
            payment: "50 coins per day".to_string(),
            duration: "3 days".to_string(),
            status: JobStatus::Open,
            applicant_count: 0,
            assigned_seeker_id: None,
            created_at: Utc::now(),
            completed_at: None,
            version: 1,
        }
    }

    fn seeker(id: &str, skills: &[&str]) -> User {
        User {
            id: UserId::new(id),
            role: Role::Seeker,
            name: id.to_string(),
            location: "South Village".to_string(),
            bio: String::new(),
            skills: normalize_skills(skills),
            rating: 0.0,
            email: None,
            phone: None,
            created_at: Utc::now(),
            version: 1,
        }
    }

    #[test]
    fn normalization_trims_lowercases_and_drops_blanks() {
        let skills = normalize_skills(["  Farming ", "", "ANIMAL care", "farming"]);
        assert_eq!(
            skills,
            BTreeSet::from(["animal care".to_string(), "farming".to_string()])
        );
    }

    #[test]
    fn matching_is_case_insensitive_and_keeps_order() {
        let jobs = vec![
            job("harvest", "North Village", "Farming", &["Farming", "heavy lifting"]),
            job("inventory", "Central Village", "Retail", &["mathematics"]),
            job("animals", "North Village", "Farming", &["animal care"]),
        ];
        let skills = normalize_skills(["farming", "Animal Care"]);

        let matched: Vec<String> = match_jobs(&skills, jobs)
            .into_iter()
            .map(|job| job.id.0)
            .collect();
        assert_eq!(matched, vec!["harvest", "animals"]);
    }

    #[test]
    fn empty_skill_sets_never_match() {
        let jobs = vec![job("harvest", "North Village", "Farming", &["farming"])];
        assert!(match_jobs(&BTreeSet::new(), jobs.clone()).is_empty());
        assert!(match_jobs(&normalize_skills(["farming"]), vec![job("x", "", "", &[])]).is_empty());
    }

    #[test]
    fn filters_are_exact_and_combine() {
        let jobs = vec![
            job("a", "North Village", "Farming", &[]),
            job("b", "north village", "Farming", &[]),
            job("c", "North Village", "Retail", &[]),
        ];
        let filter = JobFilter {
            status: Some(JobStatus::Open),
            location: Some("North Village".to_string()),
            category: Some("Farming".to_string()),
        };
        let ids: Vec<String> = filter_jobs(jobs.clone(), &filter)
            .into_iter()
            .map(|job| job.id.0)
            .collect();
        assert_eq!(ids, vec!["a"]);

        assert_eq!(filter_jobs(jobs, &JobFilter::default()).len(), 3);
    }

    #[test]
    fn status_filter_excludes_other_states() {
        let mut assigned = job("assigned", "North Village", "Farming", &[]);
        assigned.status = JobStatus::Assigned;
        let jobs = vec![job("open", "North Village", "Farming", &[]), assigned];
        let filter = JobFilter {
            status: Some(JobStatus::Assigned),
            ..JobFilter::default()
        };
        let ids: Vec<String> = filter_jobs(jobs, &filter)
            .into_iter()
            .map(|job| job.id.0)
            .collect();
        assert_eq!(ids, vec!["assigned"]);
    }

    #[test]
    fn seekers_are_selected_by_skill_overlap() {
        let seekers = vec![
            seeker("tom", &["farming", "construction"]),
            seeker("sarah", &["cooking"]),
            seeker("david", &["Heavy Lifting"]),
        ];
        let required = normalize_skills(["heavy lifting", "farming"]);
        let names: Vec<&str> = matching_seekers(&required, &seekers)
            .into_iter()
            .map(|user| user.id.as_str())
            .collect();
        assert_eq!(names, vec!["tom", "david"]);
    }
}
