pub mod raw;
pub mod std;
