use crate::infra::build_demo_marketplace;
use clap::Args;
use village_jobs::config::MarketplaceConfig;
use village_jobs::error::AppError;
use village_jobs::marketplace::{
    Caller, EventSink, JobCompletion, JobFilter, JobId, JobSpec, Marketplace, MarketplaceError,
    MarketplaceStore, NewUser, NotificationRepository, Role,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Only seed and list the village data; skip the select/complete walkthrough.
    #[arg(long)]
    pub(crate) skip_walkthrough: bool,
}

/// Callers and job ids created by [`seed_village`].
#[derive(Debug, Clone)]
pub(crate) struct VillageSeed {
    pub(crate) farmer_john: Caller,
    pub(crate) carpenter_mike: Caller,
    pub(crate) shopkeeper_lisa: Caller,
    pub(crate) tom_smith: Caller,
    pub(crate) sarah_johnson: Caller,
    pub(crate) david_lee: Caller,
    pub(crate) harvest: JobId,
    pub(crate) furniture: JobId,
    pub(crate) inventory: JobId,
    pub(crate) animal_care: JobId,
    pub(crate) festival: JobId,
}

struct Person {
    name: &'static str,
    role: Role,
    location: &'static str,
    bio: &'static str,
    skills: &'static [&'static str],
    email: &'static str,
    phone: &'static str,
}

struct Posting {
    title: &'static str,
    description: &'static str,
    location: &'static str,
    category: &'static str,
    skills: &'static [&'static str],
    payment: &'static str,
    duration: &'static str,
}

const PEOPLE: [Person; 6] = [
    Person {
        name: "Farmer John",
        role: Role::Provider,
        location: "North Village",
        bio: "I own a large farm and often need help with harvesting and maintenance.",
        skills: &[],
        email: "john@village.example",
        phone: "123-456-7890",
    },
    Person {
        name: "Carpenter Mike",
        role: Role::Provider,
        location: "East Village",
        bio: "Master carpenter looking for assistants for woodworking projects.",
        skills: &[],
        email: "mike@village.example",
        phone: "123-456-7891",
    },
    Person {
        name: "Shopkeeper Lisa",
        role: Role::Provider,
        location: "Central Village",
        bio: "I run the village general store and need help with inventory.",
        skills: &[],
        email: "lisa@village.example",
        phone: "123-456-7892",
    },
    Person {
        name: "Tom Smith",
        role: Role::Seeker,
        location: "South Village",
        bio: "Hard worker with experience in farming and construction.",
        skills: &["farming", "construction", "animal care"],
        email: "tom@village.example",
        phone: "123-456-7893",
    },
    Person {
        name: "Sarah Johnson",
        role: Role::Seeker,
        location: "West Village",
        bio: "Skilled in crafting, cooking and childcare.",
        skills: &["cooking", "childcare", "crafting"],
        email: "sarah@village.example",
        phone: "123-456-7894",
    },
    Person {
        name: "David Lee",
        role: Role::Seeker,
        location: "North Village",
        bio: "Strong and reliable worker, good with animals and farming.",
        skills: &["farming", "animal care", "heavy lifting"],
        email: "david@village.example",
        phone: "123-456-7895",
    },
];

const POSTINGS: [Posting; 5] = [
    Posting {
        title: "Harvest Help Needed",
        description: "Looking for two people to help with the wheat harvest.",
        location: "North Village",
        category: "Farming",
        skills: &["farming", "heavy lifting"],
        payment: "50 coins per day",
        duration: "3 days",
    },
    Posting {
        title: "Furniture Repair Assistant",
        description: "Help repair village furniture. Basic woodworking skills required.",
        location: "East Village",
        category: "Carpentry",
        skills: &["construction", "crafting"],
        payment: "70 coins per day",
        duration: "5 days",
    },
    Posting {
        title: "Store Inventory Manager",
        description: "Organize and manage store inventory. Must be good with numbers.",
        location: "Central Village",
        category: "Retail",
        skills: &["organization", "mathematics"],
        payment: "60 coins per day",
        duration: "Ongoing",
    },
    Posting {
        title: "Animal Caretaker",
        description: "Feed and care for farm animals while I am away.",
        location: "North Village",
        category: "Farming",
        skills: &["animal care", "farming"],
        payment: "55 coins per day",
        duration: "7 days",
    },
    Posting {
        title: "Festival Food Preparation",
        description: "Help prepare food for the upcoming village festival.",
        location: "Central Village",
        category: "Cooking",
        skills: &["cooking"],
        payment: "65 coins per day",
        duration: "2 days",
    },
];

/// Seeds the village through the public operations, leaving three jobs open, one assigned and one
/// completed with feedback.
pub(crate) fn seed_village<S, E, N>(
    marketplace: &Marketplace<S, E, N>,
) -> Result<VillageSeed, MarketplaceError>
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let farmer_john = register(marketplace, &PEOPLE[0])?;
    let carpenter_mike = register(marketplace, &PEOPLE[1])?;
    let shopkeeper_lisa = register(marketplace, &PEOPLE[2])?;
    let tom_smith = register(marketplace, &PEOPLE[3])?;
    let sarah_johnson = register(marketplace, &PEOPLE[4])?;
    let david_lee = register(marketplace, &PEOPLE[5])?;

    let harvest = post(marketplace, &farmer_john, &POSTINGS[0])?;
    let furniture = post(marketplace, &carpenter_mike, &POSTINGS[1])?;
    let inventory = post(marketplace, &shopkeeper_lisa, &POSTINGS[2])?;
    let animal_care = post(marketplace, &farmer_john, &POSTINGS[3])?;
    let festival = post(marketplace, &shopkeeper_lisa, &POSTINGS[4])?;

    let apps = &marketplace.applications;
    apps.apply_for_job(&david_lee, &harvest)?;
    apps.apply_for_job(&tom_smith, &furniture)?;
    apps.apply_for_job(&sarah_johnson, &furniture)?;

    let caretaker = apps.apply_for_job(&david_lee, &animal_care)?.into_application();
    apps.select_applicant(&farmer_john, &caretaker.id)?;

    let cook = apps.apply_for_job(&sarah_johnson, &festival)?.into_application();
    apps.select_applicant(&shopkeeper_lisa, &cook.id)?;
    marketplace.jobs.complete_job(
        &shopkeeper_lisa,
        &festival,
        JobCompletion {
            rating: 5,
            feedback: "Sarah did an excellent job with the festival food. Everyone loved it!"
                .to_string(),
        },
    )?;

    Ok(VillageSeed {
        farmer_john,
        carpenter_mike,
        shopkeeper_lisa,
        tom_smith,
        sarah_johnson,
        david_lee,
        harvest,
        furniture,
        inventory,
        animal_care,
        festival,
    })
}

fn register<S, E, N>(
    marketplace: &Marketplace<S, E, N>,
    person: &Person,
) -> Result<Caller, MarketplaceError>
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let user = marketplace.users.register(NewUser {
        name: person.name.to_string(),
        role: person.role,
        location: person.location.to_string(),
        bio: person.bio.to_string(),
        skills: person.skills.iter().map(|skill| skill.to_string()).collect(),
        email: Some(person.email.to_string()),
        phone: Some(person.phone.to_string()),
    })?;
    Ok(Caller::new(user.id.0, user.role))
}

fn post<S, E, N>(
    marketplace: &Marketplace<S, E, N>,
    owner: &Caller,
    posting: &Posting,
) -> Result<JobId, MarketplaceError>
where
    S: MarketplaceStore + 'static,
    E: EventSink + 'static,
    N: NotificationRepository + 'static,
{
    let job = marketplace.jobs.post_job(
        owner,
        JobSpec {
            title: posting.title.to_string(),
            description: posting.description.to_string(),
            location: posting.location.to_string(),
            category: posting.category.to_string(),
            required_skills: posting.skills.iter().map(|skill| skill.to_string()).collect(),
            payment: posting.payment.to_string(),
            duration: posting.duration.to_string(),
        },
    )?;
    Ok(job.id)
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let (marketplace, _) = build_demo_marketplace(MarketplaceConfig::default());
    let seed = seed_village(&marketplace)?;

    println!("Village job board");
    for job in marketplace.jobs.list_jobs(&JobFilter::default())? {
        println!(
            "- [{}] {} ({}, {}) by {} | {} applicant(s) | {}",
            job.status,
            job.title,
            job.location,
            job.category,
            job.provider_name,
            job.applicant_count,
            job.payment
        );
    }

    let matches = marketplace.jobs.list_matching_jobs(&seed.tom_smith)?;
    println!("\nOpen jobs matching Tom Smith's skills");
    for job in &matches {
        println!("- {}", job.title);
    }

    if args.skip_walkthrough {
        return Ok(());
    }

    println!("\nWalkthrough: Carpenter Mike fills the furniture job");
    let applicants = marketplace
        .applications
        .applications_for_job(&seed.carpenter_mike, &seed.furniture)?;
    for application in &applicants {
        println!(
            "  applicant {} ({}) skills: {}",
            application.seeker_name,
            application.status,
            application
                .seeker_profile
                .skills
                .iter()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let chosen = applicants
        .iter()
        .find(|application| application.seeker_id == seed.tom_smith.user_id)
        .ok_or_else(|| MarketplaceError::Validation("Tom Smith never applied".to_string()))?;
    let selection = marketplace
        .applications
        .select_applicant(&seed.carpenter_mike, &chosen.id)?;
    println!(
        "  selected {} | job now {} | {} other applicant(s) rejected",
        selection.application.seeker_name,
        selection.job.status,
        selection.rejected.len()
    );

    let late = marketplace
        .applications
        .apply_for_job(&seed.david_lee, &seed.furniture);
    if let Err(err) = late {
        println!("  late application from David Lee refused: {err}");
    }

    let completed = marketplace.jobs.complete_job(
        &seed.carpenter_mike,
        &seed.furniture,
        JobCompletion {
            rating: 5,
            feedback: "great".to_string(),
        },
    )?;
    let tom = marketplace.users.user(&seed.tom_smith.user_id)?;
    println!(
        "  job {} at {} | Tom Smith now rated {:.1}",
        completed.status,
        completed
            .completed_at
            .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default(),
        tom.rating
    );

    println!("\nNotification feeds");
    for caller in [
        &seed.farmer_john,
        &seed.carpenter_mike,
        &seed.shopkeeper_lisa,
        &seed.tom_smith,
        &seed.sarah_johnson,
        &seed.david_lee,
    ] {
        let user = marketplace.users.user(&caller.user_id)?;
        let feed = marketplace.notifications.list_for_user(caller)?;
        println!("{} ({}): {} notification(s)", user.name, user.role, feed.len());
        for notification in feed.iter().take(3) {
            println!("  - {}: {}", notification.title, notification.message);
        }
    }

    let untouched = [&seed.harvest, &seed.inventory, &seed.animal_care, &seed.festival];
    println!("\nRemaining jobs");
    for id in untouched {
        let job = marketplace.jobs.job(id)?;
        println!("- {} [{}]", job.title, job.status);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use village_jobs::marketplace::{ApplicationStatus, JobStatus};

    #[test]
    fn seeding_reproduces_the_village_board() {
        let (marketplace, notifications) = build_demo_marketplace(MarketplaceConfig::default());
        let seed = seed_village(&marketplace).expect("seed succeeds");

        let status = |id: &JobId| marketplace.jobs.job(id).expect("job").status;
        assert_eq!(status(&seed.harvest), JobStatus::Open);
        assert_eq!(status(&seed.furniture), JobStatus::Open);
        assert_eq!(status(&seed.inventory), JobStatus::Open);
        assert_eq!(status(&seed.animal_care), JobStatus::Assigned);
        assert_eq!(status(&seed.festival), JobStatus::Completed);

        let furniture = marketplace
            .applications
            .applications_for_job(&seed.carpenter_mike, &seed.furniture)
            .expect("owner view");
        assert_eq!(furniture.len(), 2);
        assert!(furniture
            .iter()
            .all(|application| application.status == ApplicationStatus::Pending));

        let sarah = marketplace
            .users
            .user(&seed.sarah_johnson.user_id)
            .expect("sarah");
        assert_eq!(sarah.rating, 5.0);
        assert_eq!(sarah.email.as_deref(), Some("sarah@village.example"));
        assert!(!notifications.is_empty());
    }

    #[test]
    fn demo_walkthrough_runs_to_completion() {
        run_demo(DemoArgs::default()).expect("demo runs");
    }
}
