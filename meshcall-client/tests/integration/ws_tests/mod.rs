mod test_ws_mesh;
