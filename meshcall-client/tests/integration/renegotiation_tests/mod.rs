mod test_failed_link_keeps_old_track;
mod test_transient_share_restores_camera;
mod test_unconnected_link_swaps_later;
