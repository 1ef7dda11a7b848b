mod helpers;
mod mailing;
mod submission;
