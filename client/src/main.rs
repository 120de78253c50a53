fn main() -> anyhow::Result<()> {
    worldmap_client::run()
}
