use std::sync::OnceLock;

use chrono::{DateTime, TimeDelta, Utc};

use super::types::JobListing;

#[derive(Debug, Clone, Copy)]
enum Age {
    Hours(i64),
    Days(i64),
}

impl Age {
    fn duration(self) -> TimeDelta {
        match self {
            Self::Hours(hours) => TimeDelta::hours(hours),
            Self::Days(days) => TimeDelta::days(days),
        }
    }
}

struct Seed {
    id: u32,
    title: &'static str,
    company: &'static str,
    location: &'static str,
    salary: &'static str,
    employment_type: &'static str,
    visa: &'static [&'static str],
    description: &'static str,
    requirements: &'static str,
    age: Age,
    category: &'static str,
}

const SEEDS: &[Seed] = &[
    // service
    Seed {
        id: 1,
        title: "Cafe Barista",
        company: "Starbucks Gangnam",
        location: "Seoul, Gangnam-gu",
        salary: "₩10,000 per hour",
        employment_type: "Part-time",
        visa: &["F-2", "F-4", "F-5", "F-6"],
        description: "Looking for a friendly barista with a passion for coffee. Experience in coffee making is a plus.",
        requirements: "Intermediate Korean, available 5 days per week",
        age: Age::Days(2),
        category: "Service",
    },
    Seed {
        id: 2,
        title: "Restaurant Server",
        company: "Bonjuk by TheBorn Korea",
        location: "Seoul, Jongno-gu",
        salary: "₩9,500 per hour",
        employment_type: "Part-time",
        visa: &["D-2", "D-4", "F-2", "F-4", "F-5", "F-6", "H-2"],
        description: "Serve food and assist customers in a Korean restaurant.",
        requirements: "Basic Korean communication, friendly attitude",
        age: Age::Days(1),
        category: "Service",
    },
    Seed {
        id: 3,
        title: "Convenience Store Night Shift",
        company: "CU Convenience Store",
        location: "Seoul, Gwanak-gu",
        salary: "₩11,000 per hour (including night bonus)",
        employment_type: "Part-time",
        visa: &["D-2", "D-4", "F-2", "F-4", "F-5", "F-6", "H-2"],
        description: "Night shift position (10 PM – 6 AM). Cashier and stocking duties.",
        requirements: "Basic Korean, responsible personality",
        age: Age::Hours(12),
        category: "Service",
    },
    Seed {
        id: 4,
        title: "Hotel Waiter / Waitress",
        company: "Shilla Hotel",
        location: "Seoul, Jung-gu",
        salary: "₩10,500 per hour",
        employment_type: "Part-time",
        visa: &["F-2", "F-4", "F-5", "F-6", "H-2"],
        description: "Serve guests at hotel restaurants and banquets.",
        requirements: "Intermediate Korean and English communication skills",
        age: Age::Days(3),
        category: "Service",
    },
    // logistics and delivery
    Seed {
        id: 5,
        title: "Warehouse Packaging Staff",
        company: "Coupang Logistics Center",
        location: "Bucheon, Gyeonggi-do",
        salary: "₩12,000 per hour",
        employment_type: "Short-term",
        visa: &["E-9", "H-2", "F-2", "F-4", "F-5"],
        description: "Work includes packing and preparing goods for shipment in a warehouse environment.",
        requirements: "Physically fit, basic Korean understanding",
        age: Age::Days(1),
        category: "Logistics/Delivery",
    },
    Seed {
        id: 6,
        title: "Delivery Rider",
        company: "Baemin Delivery",
        location: "Incheon, Namdong-gu",
        salary: "₩15,000 per delivery hour (average)",
        employment_type: "Part-time",
        visa: &["H-2", "F-4", "F-5", "F-6"],
        description: "Deliver food orders around local neighborhoods using a motorbike.",
        requirements: "Motorcycle license, smartphone with GPS",
        age: Age::Days(1),
        category: "Logistics/Delivery",
    },
    Seed {
        id: 7,
        title: "Warehouse Loader",
        company: "CJ Logistics",
        location: "Gimpo, Gyeonggi-do",
        salary: "₩11,500 per hour",
        employment_type: "Full-time",
        visa: &["E-9", "H-2", "F-4", "F-5"],
        description: "Loading and unloading parcels and organizing warehouse space.",
        requirements: "Physically strong and able to lift packages up to 20kg",
        age: Age::Days(2),
        category: "Logistics/Delivery",
    },
    // it and development
    Seed {
        id: 8,
        title: "Backend Developer (Python/Django)",
        company: "Tech Startup Korea",
        location: "Seoul, Gangnam-gu",
        salary: "₩40M–₩60M per year",
        employment_type: "Full-time",
        visa: &["E-7", "F-2", "F-5"],
        description: "We are looking for an experienced backend engineer to build scalable systems.",
        requirements: "3+ years of Python experience, AWS experience preferred",
        age: Age::Days(7),
        category: "IT/Development",
    },
    Seed {
        id: 9,
        title: "Frontend Developer (React)",
        company: "NextGen Web Labs",
        location: "Seoul, Mapo-gu",
        salary: "₩45M–₩65M per year",
        employment_type: "Full-time",
        visa: &["E-7", "F-2", "F-5"],
        description: "Develop responsive web interfaces using React and TypeScript.",
        requirements: "2+ years frontend experience, portfolio preferred",
        age: Age::Days(5),
        category: "IT/Development",
    },
    Seed {
        id: 10,
        title: "Data Analyst Intern",
        company: "K-Digital Analytics",
        location: "Seoul, Seocho-gu",
        salary: "₩2,000,000 per month",
        employment_type: "Internship",
        visa: &["D-2", "D-10", "F-2", "F-5", "F-6"],
        description: "Assist data team with SQL queries, dashboards, and basic data visualization.",
        requirements: "Knowledge of Python, Excel, and data analytics tools",
        age: Age::Days(3),
        category: "IT/Development",
    },
    // education
    Seed {
        id: 11,
        title: "English Instructor",
        company: "ABC Language Academy",
        location: "Seoul, Songpa-gu",
        salary: "₩2,500,000 per month",
        employment_type: "Full-time",
        visa: &["E-2", "F-2", "F-5", "F-6"],
        description: "Teach conversational English to elementary school students in small classes.",
        requirements: "Native-level English, teaching experience preferred",
        age: Age::Days(5),
        category: "Education",
    },
    Seed {
        id: 12,
        title: "Math Tutor",
        company: "Bright Minds Academy",
        location: "Seoul, Seongdong-gu",
        salary: "₩25,000 per hour",
        employment_type: "Part-time",
        visa: &["F-2", "F-5", "F-6"],
        description: "Private tutoring for middle school math students. Materials provided.",
        requirements: "Fluent Korean or English, tutoring experience a plus",
        age: Age::Days(2),
        category: "Education",
    },
    // manufacturing
    Seed {
        id: 13,
        title: "Factory Line Worker",
        company: "Samsung Electronics Partner",
        location: "Suwon, Gyeonggi-do",
        salary: "₩2,200,000 per month",
        employment_type: "Full-time",
        visa: &["E-9", "H-2", "F-4", "F-5"],
        description: "Assemble electronic devices on production lines. Dormitory provided.",
        requirements: "Hardworking, night shift availability preferred",
        age: Age::Days(4),
        category: "Manufacturing",
    },
    Seed {
        id: 14,
        title: "Machine Operator",
        company: "Hyundai Precision Parts",
        location: "Ulsan, Nam-gu",
        salary: "₩2,500,000 per month",
        employment_type: "Full-time",
        visa: &["E-9", "H-2", "F-4", "F-5"],
        description: "Operate metal-cutting and assembly machines in an auto parts plant.",
        requirements: "Basic Korean, manufacturing experience preferred",
        age: Age::Days(3),
        category: "Manufacturing",
    },
    // marketing and pr
    Seed {
        id: 15,
        title: "Marketing Intern",
        company: "Global Marketing Co.",
        location: "Seoul, Yeongdeungpo-gu",
        salary: "₩1,800,000 per month",
        employment_type: "Internship",
        visa: &["D-2", "D-10", "F-2", "F-5", "F-6"],
        description: "Assist in social media marketing, content creation, and campaign analysis.",
        requirements: "Advanced Korean, interest in digital marketing",
        age: Age::Days(2),
        category: "Marketing/PR",
    },
    Seed {
        id: 16,
        title: "Social Media Manager",
        company: "Seoul Trend Agency",
        location: "Seoul, Gangnam-gu",
        salary: "₩3,000,000 per month",
        employment_type: "Full-time",
        visa: &["E-7", "F-2", "F-5", "F-6"],
        description: "Manage Instagram, TikTok, and YouTube accounts for brand clients.",
        requirements: "Experience in influencer marketing, fluent English",
        age: Age::Days(4),
        category: "Marketing/PR",
    },
    // translation and interpretation
    Seed {
        id: 17,
        title: "Chinese Translator",
        company: "Global Translation Agency",
        location: "Seoul, Mapo-gu",
        salary: "Negotiable per project",
        employment_type: "Freelance",
        visa: &["F-2", "F-4", "F-5", "F-6"],
        description: "Translation between Chinese and Korean. Remote work available.",
        requirements: "Native Chinese proficiency, 2+ years translation experience",
        age: Age::Days(3),
        category: "Translation/Interpretation",
    },
    Seed {
        id: 18,
        title: "Japanese Interpreter",
        company: "Korea Trade Center",
        location: "Busan, Haeundae-gu",
        salary: "₩250,000 per day",
        employment_type: "Freelance",
        visa: &["F-2", "F-4", "F-5", "F-6"],
        description: "Interpret for business meetings between Korean and Japanese clients.",
        requirements: "Fluent in Japanese and Korean, experience in trade preferred",
        age: Age::Days(2),
        category: "Translation/Interpretation",
    },
];

static DATASET: OnceLock<Vec<JobListing>> = OnceLock::new();

/// The job board, built on first use with posting times relative to that moment.
pub fn dataset() -> &'static [JobListing] {
    DATASET.get_or_init(|| build_dataset(Utc::now()))
}

/// Builds the listings as seen at `now`. Rows keep their board order.
pub fn build_dataset(now: DateTime<Utc>) -> Vec<JobListing> {
    SEEDS
        .iter()
        .map(|seed| JobListing {
            id: seed.id,
            title: seed.title.to_string(),
            company: seed.company.to_string(),
            location: seed.location.to_string(),
            salary: seed.salary.to_string(),
            employment_type: seed.employment_type.to_string(),
            visa: seed.visa.iter().map(|code| code.to_string()).collect(),
            description: seed.description.to_string(),
            requirements: seed.requirements.to_string(),
            posted_at: now - seed.age.duration(),
            category: seed.category.to_string(),
        })
        .collect()
}

pub fn find_listing(listings: &[JobListing], id: u32) -> Option<&JobListing> {
    listings.iter().find(|listing| listing.id == id)
}
