fn main() {
    voxel_instance_store::run();
}
