//! Lambda entry points for the items service functions.
//!
//! Each binary runs one compute function behind the API Gateway REST proxy
//! integration; the table binding comes from `PRIMARY_KEY` / `TABLE_NAME`.

pub mod apigw;
pub mod errors;
pub mod runtime;
