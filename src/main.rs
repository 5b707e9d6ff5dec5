fn main() -> anyhow::Result<()> {
    notepad_session::cli::run()
}
