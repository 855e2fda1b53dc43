pub mod financing;
pub mod withdrawal;
