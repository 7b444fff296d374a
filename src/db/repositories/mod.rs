mod client_timings;
mod custom_timings;
mod profilers;
mod timings;
