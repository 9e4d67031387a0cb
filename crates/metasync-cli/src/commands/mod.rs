pub mod lint;
pub mod list;
pub mod run;
