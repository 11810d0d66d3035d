mod common;
mod training;
