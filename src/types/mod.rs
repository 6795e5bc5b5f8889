/*!
Types used across the library.
*/

pub mod err;
