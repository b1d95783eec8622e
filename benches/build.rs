use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use glam::{Vec3, Vec3A};
use quadbvh::{Bvh4Builder, Scene, TriangleLayout, TriangleMesh};

struct Rng(u64);

impl Rng {
    fn next(&mut self) -> f32 {
        self.0 ^= self.0 >> 12;
        self.0 ^= self.0 << 25;
        self.0 ^= self.0 >> 27;
        let bits = self.0.wrapping_mul(0x2545F4914F6CDD1D);
        (bits >> 40) as f32 / (1u64 << 24) as f32
    }
}

fn random_scene(n: usize) -> Scene {
    let mut rng = Rng(0x9E3779B97F4A7C15);
    let mut vertices = Vec::with_capacity(n * 3);
    let mut indices = Vec::with_capacity(n);
    for i in 0..n {
        let p = Vec3::new(
            rng.next() * 1000.0,
            rng.next() * 1000.0,
            rng.next() * 1000.0,
        );
        let base = (i * 3) as u32;
        vertices.push(Vec3A::from(p));
        vertices.push(Vec3A::from(p + Vec3::new(rng.next(), rng.next(), rng.next())));
        vertices.push(Vec3A::from(p + Vec3::new(rng.next(), rng.next(), rng.next())));
        indices.push([base, base + 1, base + 2]);
    }
    let mut scene = Scene::new();
    scene.add_mesh(TriangleMesh::new(vertices, indices));
    scene
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");

    for &n in &[10_000usize, 100_000] {
        let scene = random_scene(n);
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("sequential", n), &scene, |b, scene| {
            b.iter(|| {
                Bvh4Builder::new(black_box(scene), TriangleLayout::Triangle4)
                    .build(1)
                    .unwrap()
            })
        });

        group.bench_with_input(BenchmarkId::new("parallel", n), &scene, |b, scene| {
            b.iter(|| {
                Bvh4Builder::new(black_box(scene), TriangleLayout::Triangle4)
                    .build(8)
                    .unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build);
criterion_main!(benches);
