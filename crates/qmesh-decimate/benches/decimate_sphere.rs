use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use qmesh_decimate::{decimate, IndexData, Operation, VertexData};

fn uv_sphere(rings: u32, sectors: u32, radius: f64) -> (Vec<f64>, Vec<u32>) {
    let mut vertices = Vec::new();
    for r in 0..rings {
        let phi = std::f64::consts::PI * (r as f64 + 0.5) / rings as f64;
        for s in 0..sectors {
            let theta = 2.0 * std::f64::consts::PI * s as f64 / sectors as f64;
            vertices.extend_from_slice(&[
                radius * phi.sin() * theta.cos(),
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
            ]);
        }
    }
    let mut indices = Vec::new();
    for r in 0..rings - 1 {
        for s in 0..sectors {
            let a = r * sectors + s;
            let b = r * sectors + (s + 1) % sectors;
            indices.extend_from_slice(&[a, b, b + sectors]);
            indices.extend_from_slice(&[a, b + sectors, a + sectors]);
        }
    }
    (vertices, indices)
}

fn bench_decimate(c: &mut Criterion) {
    let (vertices, indices) = uv_sphere(100, 100, 1.0);
    let mut group = c.benchmark_group("decimate_sphere");
    group.sample_size(10);

    for threads in [1usize, 4] {
        group.bench_function(format!("threads_{threads}"), |b| {
            b.iter_batched(
                || (vertices.clone(), indices.clone()),
                |(mut v, mut i)| {
                    let mut op =
                        Operation::new(VertexData::F64(&mut v), 3, IndexData::U32(&mut i), 3);
                    op.set_feature_size(0.2);
                    decimate(&mut op, threads).unwrap()
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decimate);
criterion_main!(benches);
