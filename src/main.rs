use vbo_playground::flow::{self, Scene, SceneConfig, WindowConfig};

fn main() -> anyhow::Result<()> {
    flow::run(Scene::new(SceneConfig::default()), WindowConfig::default())
}
