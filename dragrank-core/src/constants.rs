/// Label → rank table for the six-level scheme (WIN best, ELIM worst).
pub const SIX_LEVEL_RANKS: &[(&str, u8)] = &[
    ("WIN", 1),
    ("Winner", 1),
    ("Runner-up", 2),
    ("HIGH", 2),
    ("SAFE", 3),
    ("LOW", 4),
    ("BTM2", 5),
    ("BTM6", 5),
    ("ELIM", 6),
    ("Eliminated", 6),
    ("Guest", 6),
    ("Miss C", 6),
    ("DISQ", 6),
    ("OUT", 6),
];

/// Label → rank table for the coarse winner / safe / bottom scheme.
pub const THREE_LEVEL_RANKS: &[(&str, u8)] = &[
    ("WIN", 1),
    ("Winner", 1),
    ("SAFE", 2),
    ("LOW", 2),
    ("HIGH", 2),
    ("Runner-up", 2),
    ("Guest", 2),
    ("Miss C", 2),
    ("DISQ", 2),
    ("OUT", 2),
    ("BTM2", 3),
    ("ELIM", 3),
    ("Eliminated", 3),
];

/// Labels that mark a contestant as leaving the competition.
pub const DEFAULT_ELIMINATED: &[&str] = &["Eliminated", "DISQ", "OUT", "ELIM"];

/// Labels that are not a competitive result (guest spots, disqualifications,
/// congeniality awards). Rows carrying them never reach the model.
pub const DEFAULT_IGNORE: &[&str] = &["Guest", "DISQ", "Miss C"];

/// Episode type of rows that count towards abilities.
pub const COMPETITION_EPISODE_TYPE: &str = "Competition";

/// Hometowns flagged by the `is_reference_city` covariate.
pub const DEFAULT_REFERENCE_CITIES: &[&str] = &["New York", "Brooklyn"];

/// Predictors used when none are configured.
pub const DEFAULT_PREDICTORS: &[&str] = &["age_z", "twitter_rank"];

/// Value standing in for an undefined standardized score.
pub const NEUTRAL_FALLBACK: f64 = 0.0;

/// Standard deviations below this are treated as zero variance.
pub const STDEV_EPSILON: f64 = 1e-12;

/// Quantiles reported for every contestant unless configured otherwise.
pub const DEFAULT_QUANTILES: &[f64] = &[0.1, 0.5, 0.9];

/// Tolerance used when checking that probability columns sum to one.
pub const PROBABILITY_TOLERANCE: f64 = 1e-9;
