mod common;
mod notification;
mod tracking;
