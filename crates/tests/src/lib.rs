pub mod fixtures;

#[cfg(test)]
mod join_publish_subscribe_tests;
#[cfg(test)]
mod cross_host_connect_tests;
#[cfg(test)]
mod dtmf_tests;
#[cfg(test)]
mod content_floor_tests;
#[cfg(test)]
mod mcu_lifecycle_tests;
#[cfg(test)]
mod renegotiation_tests;
#[cfg(test)]
mod host_offline_tests;
