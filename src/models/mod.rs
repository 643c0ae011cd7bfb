pub mod event;
pub mod route;
pub mod stop;
