mod batch;
mod candidates;
mod cli;
mod images;
