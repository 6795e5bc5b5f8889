/*!
Small items with no better home.
*/

pub mod log;
