pub mod assignments;
pub mod classrooms;
pub mod core;
pub mod groups;
pub mod subjects;
pub mod teachers;
