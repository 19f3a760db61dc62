mod common;

mod skin;
