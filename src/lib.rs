pub mod core {
    pub mod config;
    pub mod error;
    pub mod routes;
    pub mod startup;
    pub mod state;
    pub mod tracing_init;
}

pub mod accounting {
    pub mod traffic;
}

pub mod bencode {
    pub mod compact;
    pub mod encoder;
    pub mod response;
}

pub mod metrics {
    pub mod collector;
}

pub mod models {
    pub mod admin;
    pub mod peer;
}

pub mod security {
    pub mod access_control;
    pub mod rate_limiter;
}

pub mod stores {
    pub mod access_list;
    pub mod swarm_store;
}

pub mod udp {
    pub mod connection;
    pub mod protocol;
    pub mod server;
}

pub mod utils {
    pub mod auth;
    pub mod hex;
    pub mod time;
}

pub mod validation {
    pub mod params;
}

pub mod wal {
    pub mod wal;
}

pub mod engine;
pub mod handlers;
