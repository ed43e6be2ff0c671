//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use workouts::{HttpResponse, HttpTransport, Result};

#[derive(Debug, Clone)]
pub struct Request {
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub form: Vec<(String, String)>,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn form_value(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_get(&self) -> bool {
        self.method == "GET"
    }
}

type Responder = dyn Fn(&Request) -> Result<HttpResponse> + Send + Sync;

/// Scripted transport that records every request
pub struct Recorder {
    responder: Box<Responder>,
    requests: Mutex<Vec<Request>>,
}

impl Recorder {
    pub fn new(
        responder: impl Fn(&Request) -> Result<HttpResponse> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn gets(&self) -> usize {
        self.requests().iter().filter(|r| r.is_get()).count()
    }

    pub fn posts(&self) -> usize {
        self.requests().iter().filter(|r| !r.is_get()).count()
    }

    fn record(&self, request: Request) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(&request)
    }
}

fn owned(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl HttpTransport for Recorder {
    fn get(&self, url: &str, headers: &[(&str, &str)]) -> Result<HttpResponse> {
        self.record(Request {
            method: "GET",
            url: url.to_string(),
            headers: owned(headers),
            form: Vec::new(),
        })
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse> {
        self.record(Request {
            method: "POST",
            url: url.to_string(),
            headers: Vec::new(),
            form: owned(form),
        })
    }
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 10, 12, 0, 0).unwrap()
}

/// One Strava summary activity
pub fn strava_activity(id: usize) -> String {
    format!(
        r#"{{"id":{id},"name":"Run {id}","sport_type":"Run","start_date":"2026-04-09T06:00:00Z","elapsed_time":1800,"distance":5000.0}}"#
    )
}

pub fn strava_page(ids: std::ops::Range<usize>) -> String {
    let items: Vec<String> = ids.map(strava_activity).collect();
    format!("[{}]", items.join(","))
}

/// Value of a query parameter in a recorded URL
pub fn query_param<'a>(url: &'a str, name: &str) -> Option<&'a str> {
    let (_, query) = url.split_once('?')?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then_some(v)
    })
}
