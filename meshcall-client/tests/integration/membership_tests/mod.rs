mod test_full_mesh_forms;
mod test_peer_leaves_others_stay;
