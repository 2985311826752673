pub mod contact;
pub mod event;
pub mod lead;
pub mod reply;
