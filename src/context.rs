//! Process-wide correlation state shared between the managers and the API
//! worker. Single writer per field: the session manager fills the session
//! and car ids, the worker writes back the backend-assigned stint and
//! pit-stop ids, everyone else only reads.

use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
pub struct RaceContext {
    pub session_id: Option<i64>,
    pub car_id: Option<i64>,
    pub stint_id: Option<i64>,
    pub stint_number: Option<i32>,
    pub pitstop_id: Option<i64>,
    pub user_name: String,
}

pub type SharedRaceContext = Arc<Mutex<RaceContext>>;

impl RaceContext {
    pub fn shared(user_name: &str) -> SharedRaceContext {
        Arc::new(Mutex::new(RaceContext {
            user_name: user_name.to_string(),
            ..RaceContext::default()
        }))
    }
}
