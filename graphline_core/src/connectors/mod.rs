// Microsoft Graph: mail, calendar, To Do
pub mod graph;

// Always available, needs no credentials
pub mod system;
