// builders + trackers + the iteration loop shared by the chapter programs
pub mod builders;
pub mod trainer;
pub mod utils;
