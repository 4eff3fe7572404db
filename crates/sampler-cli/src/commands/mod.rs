pub mod cvs;
pub mod run;
