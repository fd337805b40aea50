mod test_candidate_ordering;
mod test_concurrent_callees;
mod test_hang_up;
mod test_webrtc_loopback;
