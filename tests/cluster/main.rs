mod fixtures;
mod test_api;
mod test_cluster;
mod test_single_node;
